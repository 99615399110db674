//! Streaming load pipeline.
//!
//! A [`BatchPipeline`] plans the target columns once, then streams data lines
//! into the store. Writes run as spawned tasks in a window bounded by the
//! batch size; when the window fills, every outstanding write is awaited
//! before the next line is read. The first failure aborts the run and the
//! writes still in flight are cancelled.

use std::{
    io::Read,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, error, info, warn};
use num_bigint::BigInt;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{
    data::{Value, convert},
    error::{ConversionError, LoadError, RunFailure, StoreError},
    io_utils::{DEFAULT_DELIMITER, decode_record, delimited_reader, open_input, read_headers},
    mapping::MappingConfiguration,
    planner::{ColumnPlan, ColumnSource, PlannedColumn, plan},
    progress::{ProgressEstimator, ProgressTracker},
    schema::SchemaIntrospector,
    session::{InsertStatement, PreparedStatement, StoreSession},
    statement::{CacheStats, StatementCache},
    types::ColumnType,
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 256;
pub const DEFAULT_PROGRESS_SAMPLE_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Planning,
    Streaming,
    Draining,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub keyspace: String,
    pub batch_size: usize,
    pub statement_cache_size: usize,
    pub progress_sample_lines: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl LoadOptions {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            progress_sample_lines: DEFAULT_PROGRESS_SAMPLE_LINES,
            delimiter: DEFAULT_DELIMITER,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub estimated_lines: Option<u64>,
    /// Highest progress percentage reported.
    pub watermark: u64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metrics: RunMetrics,
    pub elapsed: Duration,
    pub cache: CacheStats,
    pub plan: ColumnPlan,
    /// Mapping with auto-matched headers recorded.
    pub mapping: MappingConfiguration,
}

impl RunSummary {
    /// Inserted rows per second.
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.metrics.rows_inserted as f64 / seconds
        } else {
            self.metrics.rows_inserted as f64
        }
    }
}

pub struct BatchPipeline {
    session: Arc<dyn StoreSession>,
    mapping: MappingConfiguration,
    options: LoadOptions,
    state: PipelineState,
}

impl BatchPipeline {
    pub fn new(
        session: Arc<dyn StoreSession>,
        mapping: MappingConfiguration,
        options: LoadOptions,
    ) -> Self {
        Self {
            session,
            mapping,
            options,
            state: PipelineState::Planning,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn mapping(&self) -> &MappingConfiguration {
        &self.mapping
    }

    /// Loads `path`, or stdin when `path` is `-`.
    pub async fn run(&mut self, path: &Path) -> Result<RunSummary, RunFailure> {
        let estimate = match ProgressEstimator::new(self.options.progress_sample_lines)
            .estimate_path(path)
        {
            Ok(estimate) => estimate.map(|e| e.lines()),
            Err(err) => {
                warn!("Unable to estimate line count of {path:?}: {err}");
                None
            }
        };
        let input = open_input(path).map_err(|err| self.fail(0, None, 0, LoadError::Io(err)))?;
        self.run_reader(input, estimate).await
    }

    pub async fn run_reader<R: Read>(
        &mut self,
        input: R,
        estimate: Option<u64>,
    ) -> Result<RunSummary, RunFailure> {
        let started = Instant::now();
        self.state = PipelineState::Planning;
        let mut reader = delimited_reader(input, self.options.delimiter);
        let plan = self
            .plan_columns(&mut reader)
            .await
            .map_err(|error| self.fail(1, None, 0, error))?;

        self.state = PipelineState::Streaming;
        let mut metrics = RunMetrics {
            estimated_lines: estimate,
            ..RunMetrics::default()
        };
        let mut tracker = ProgressTracker::new(estimate);
        let mut cache = StatementCache::new(self.options.statement_cache_size);
        let mut window = WriteWindow::new(self.options.batch_size);
        let now = Utc::now();
        let mut record = csv::ByteRecord::new();

        loop {
            let line = reader.position().line() as usize;
            match reader.read_byte_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let error = LoadError::Input(format!("Reading line {line}: {err}"));
                    return Err(self.abort(&mut window, &mut metrics, line, None, error).await);
                }
            }
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(line);
            metrics.rows_read += 1;

            let fields = match decode_record(&record, self.options.encoding) {
                Ok(fields) => fields,
                Err(error) => {
                    return Err(self.abort(&mut window, &mut metrics, line, None, error).await);
                }
            };
            let (columns, values) =
                match assemble_row(&plan, &fields, metrics.rows_read, now, line) {
                    Ok(row) => row,
                    Err((field, error)) => {
                        return Err(self.abort(&mut window, &mut metrics, line, field, error).await);
                    }
                };
            if columns.is_empty() {
                debug!("Line {line} produced no values; nothing written");
                continue;
            }

            let statement =
                InsertStatement::new(&self.options.keyspace, self.mapping.table(), columns);
            let prepared = match cache
                .get_or_prepare(self.session.as_ref(), &statement)
                .await
            {
                Ok(prepared) => prepared,
                Err(err) => {
                    let error = LoadError::Write(err);
                    return Err(self.abort(&mut window, &mut metrics, line, None, error).await);
                }
            };
            window.spawn(Arc::clone(&self.session), prepared, values, line);

            if window.is_full() {
                self.drain(&mut window, &mut metrics, &mut tracker).await?;
            }
        }

        self.state = PipelineState::Draining;
        self.drain(&mut window, &mut metrics, &mut tracker).await?;
        if let Some(percent) = tracker.finish(metrics.rows_inserted) {
            report_progress(percent, metrics.rows_inserted);
        }
        metrics.estimated_lines = tracker.estimate();
        metrics.watermark = tracker.watermark();
        self.state = PipelineState::Completed;

        let summary = RunSummary {
            metrics,
            elapsed: started.elapsed(),
            cache: cache.stats(),
            plan,
            mapping: self.mapping.clone(),
        };
        info!(
            "Loaded {} of {} row(s) into {}.{} in {:.2?} ({:.0} rows/s)",
            summary.metrics.rows_inserted,
            summary.metrics.rows_read,
            self.options.keyspace,
            self.mapping.table(),
            summary.elapsed,
            summary.throughput()
        );
        info!(
            "Statement cache: {} hit(s), {} miss(es), {} eviction(s)",
            summary.cache.hits, summary.cache.misses, summary.cache.evictions
        );
        Ok(summary)
    }

    async fn plan_columns<R: Read>(
        &mut self,
        reader: &mut csv::Reader<R>,
    ) -> Result<ColumnPlan, LoadError> {
        let headers = read_headers(reader, self.options.encoding)?
            .ok_or_else(|| LoadError::Input("Input has no header line".to_string()))?;
        let keyspace = &self.options.keyspace;
        let table = self.mapping.table();
        let types = SchemaIntrospector::new(self.session.as_ref())
            .require_table(keyspace, table)
            .await?;
        let plan = plan(&headers, &self.mapping, &types)?;
        info!(
            "Planned {} column(s) for {keyspace}.{table}: {}",
            plan.len(),
            plan.column_names().join(", ")
        );
        if !plan.auto_matched().is_empty() {
            self.mapping = self
                .mapping
                .clone()
                .with_header_mappings(plan.auto_matched().iter().cloned());
        }
        Ok(plan)
    }

    async fn drain(
        &mut self,
        window: &mut WriteWindow,
        metrics: &mut RunMetrics,
        tracker: &mut ProgressTracker,
    ) -> Result<(), RunFailure> {
        let outstanding = window.len();
        match window.drain().await {
            Ok(completed) => {
                metrics.rows_inserted += completed;
                debug!("Joined {outstanding} write(s); {} inserted", metrics.rows_inserted);
                if let Some(percent) = tracker.record(metrics.rows_inserted) {
                    report_progress(percent, metrics.rows_inserted);
                }
                Ok(())
            }
            Err(failure) => {
                metrics.rows_inserted += failure.completed;
                Err(self.fail(failure.line, None, metrics.rows_inserted, failure.error))
            }
        }
    }

    async fn abort(
        &mut self,
        window: &mut WriteWindow,
        metrics: &mut RunMetrics,
        line: usize,
        field: Option<usize>,
        error: LoadError,
    ) -> RunFailure {
        metrics.rows_inserted += window.abort().await;
        self.fail(line, field, metrics.rows_inserted, error)
    }

    fn fail(
        &mut self,
        line: usize,
        field: Option<usize>,
        inserted: u64,
        error: LoadError,
    ) -> RunFailure {
        self.state = PipelineState::Failed;
        let failure = RunFailure {
            line,
            field,
            inserted,
            error,
        };
        error!("{failure}");
        failure
    }
}

fn report_progress(percent: u64, inserted: u64) {
    info!("Progress: {percent}% ({inserted} row(s) inserted)");
}

type WriteOutcome = (usize, Result<(), StoreError>);

struct WriteFailure {
    completed: u64,
    line: usize,
    error: LoadError,
}

/// Outstanding writes, tagged with the input line that produced them.
struct WriteWindow {
    tasks: JoinSet<WriteOutcome>,
    capacity: usize,
    last_line: usize,
}

impl WriteWindow {
    fn new(capacity: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            capacity: capacity.max(1),
            last_line: 0,
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_full(&self) -> bool {
        self.tasks.len() >= self.capacity
    }

    fn spawn(
        &mut self,
        session: Arc<dyn StoreSession>,
        prepared: Arc<PreparedStatement>,
        values: Vec<Value>,
        line: usize,
    ) {
        self.last_line = line;
        self.tasks.spawn(async move {
            let result = session.execute(&prepared, values).await;
            (line, result)
        });
    }

    /// Awaits every outstanding write, returning how many succeeded.
    async fn drain(&mut self) -> Result<u64, WriteFailure> {
        let mut completed = 0;
        while let Some(joined) = self.tasks.join_next().await {
            let (line, error) = match joined {
                Ok((_, Ok(()))) => {
                    completed += 1;
                    continue;
                }
                Ok((line, Err(err))) => (line, LoadError::Write(err)),
                Err(err) => (
                    self.last_line,
                    LoadError::Write(StoreError::WriteFailed(format!("Write task failed: {err}"))),
                ),
            };
            completed += self.abort().await;
            return Err(WriteFailure {
                completed,
                line,
                error,
            });
        }
        Ok(completed)
    }

    /// Cancels outstanding writes, returning how many had already succeeded.
    async fn abort(&mut self) -> u64 {
        self.tasks.abort_all();
        let mut completed = 0;
        while let Some(joined) = self.tasks.join_next().await {
            if matches!(joined, Ok((_, Ok(())))) {
                completed += 1;
            }
        }
        completed
    }
}

/// Resolves every planned column for one row, keeping non-null values only.
/// Cells missing from a short row read as blank.
fn assemble_row(
    plan: &ColumnPlan,
    fields: &[String],
    row_number: u64,
    now: DateTime<Utc>,
    line: usize,
) -> Result<(Vec<String>, Vec<Value>), (Option<usize>, LoadError)> {
    let mut columns = Vec::with_capacity(plan.len());
    let mut values = Vec::with_capacity(plan.len());
    for column in plan.columns() {
        let value = resolve_value(column, fields, row_number, now).map_err(|(field, source)| {
            (
                field,
                LoadError::TypeConversion {
                    line,
                    column: column.name.clone(),
                    source,
                },
            )
        })?;
        if let Some(value) = value {
            columns.push(column.name.clone());
            values.push(value);
        }
    }
    Ok((columns, values))
}

fn resolve_value(
    column: &PlannedColumn,
    fields: &[String],
    row_number: u64,
    now: DateTime<Utc>,
) -> Result<Option<Value>, (Option<usize>, ConversionError)> {
    let ty = &column.column_type;
    match &column.source {
        ColumnSource::Header {
            index, fallback, ..
        } => {
            let cell = fields.get(*index).map(String::as_str).unwrap_or("");
            let value = convert(cell, ty).map_err(|err| (Some(index + 1), err))?;
            Ok(value.or_else(|| fallback.clone()))
        }
        ColumnSource::Synthetic { value, .. } => Ok(value.clone()),
        ColumnSource::Timestamp => {
            generated(ty, timestamp_value(ty, now), || now.to_rfc3339()).map_err(|e| (None, e))
        }
        ColumnSource::LineNumber => {
            generated(ty, line_number_value(ty, row_number), || row_number.to_string())
                .map_err(|e| (None, e))
        }
        ColumnSource::Uuid => {
            let id = Uuid::new_v4();
            let native = matches!(ty, ColumnType::Uuid).then_some(Value::Uuid(id));
            generated(ty, native, || id.to_string()).map_err(|e| (None, e))
        }
    }
}

/// Uses the native value when the type has one; otherwise converts the
/// rendered text, which covers text columns.
fn generated(
    ty: &ColumnType,
    native: Option<Value>,
    render: impl FnOnce() -> String,
) -> Result<Option<Value>, ConversionError> {
    match native {
        Some(value) => Ok(Some(value)),
        None => convert(&render(), ty),
    }
}

fn timestamp_value(ty: &ColumnType, now: DateTime<Utc>) -> Option<Value> {
    match ty {
        ColumnType::Timestamp => Some(Value::Timestamp(now)),
        ColumnType::BigInt => Some(Value::BigInt(now.timestamp_millis())),
        _ => None,
    }
}

fn line_number_value(ty: &ColumnType, row_number: u64) -> Option<Value> {
    match ty {
        ColumnType::Int => i32::try_from(row_number).ok().map(Value::Int),
        ColumnType::BigInt => i64::try_from(row_number).ok().map(Value::BigInt),
        ColumnType::Varint => Some(Value::Varint(BigInt::from(row_number))),
        ColumnType::Decimal => Some(Value::Decimal(BigDecimal::new(
            BigInt::from(row_number),
            0,
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(name: &str, column_type: ColumnType, source: ColumnSource) -> PlannedColumn {
        PlannedColumn {
            name: name.to_string(),
            column_type,
            source,
        }
    }

    fn header(index: usize, fallback: Option<Value>) -> ColumnSource {
        ColumnSource::Header {
            header: format!("H{index}"),
            index,
            auto_matched: false,
            fallback,
        }
    }

    #[test]
    fn blank_cells_fall_back_to_the_synthetic_default() {
        let column = planned("age", ColumnType::Int, header(1, Some(Value::Int(18))));
        let now = Utc::now();
        let fields = vec!["x".to_string(), "".to_string()];
        assert_eq!(
            resolve_value(&column, &fields, 1, now).unwrap(),
            Some(Value::Int(18))
        );
        let fields = vec!["x".to_string(), "42".to_string()];
        assert_eq!(
            resolve_value(&column, &fields, 1, now).unwrap(),
            Some(Value::Int(42))
        );
        assert_eq!(
            resolve_value(&column, &["x".to_string()], 1, now).unwrap(),
            Some(Value::Int(18))
        );
    }

    #[test]
    fn conversion_failures_carry_the_field_position() {
        let column = planned("age", ColumnType::Int, header(2, None));
        let fields = vec!["a".into(), "b".into(), "old".into()];
        let (field, err) = resolve_value(&column, &fields, 1, Utc::now()).unwrap_err();
        assert_eq!(field, Some(3));
        assert_eq!(err.text(), "old");
    }

    #[test]
    fn generated_values_follow_the_declared_type() {
        let now = Utc::now();
        let line = planned("line", ColumnType::BigInt, ColumnSource::LineNumber);
        assert_eq!(
            resolve_value(&line, &[], 7, now).unwrap(),
            Some(Value::BigInt(7))
        );
        let line = planned("line", ColumnType::Varint, ColumnSource::LineNumber);
        assert_eq!(
            resolve_value(&line, &[], 7, now).unwrap(),
            Some(Value::Varint(BigInt::from(7)))
        );
        let line = planned("line", ColumnType::Text, ColumnSource::LineNumber);
        assert_eq!(
            resolve_value(&line, &[], 7, now).unwrap(),
            Some(Value::Text("7".into()))
        );
        let ts = planned("ts", ColumnType::Timestamp, ColumnSource::Timestamp);
        assert_eq!(
            resolve_value(&ts, &[], 1, now).unwrap(),
            Some(Value::Timestamp(now))
        );
        let id = planned("id", ColumnType::Text, ColumnSource::Uuid);
        match resolve_value(&id, &[], 1, now).unwrap() {
            Some(Value::Text(text)) => assert!(Uuid::parse_str(&text).is_ok()),
            other => panic!("expected rendered uuid, got {other:?}"),
        }
    }

    #[test]
    fn rows_keep_only_non_null_values() {
        let plan_columns = vec![
            planned("name", ColumnType::Text, header(0, None)),
            planned("age", ColumnType::Int, header(1, None)),
        ];
        let plan = ColumnPlan::from_columns(plan_columns);
        let fields = vec!["Ada".to_string(), " ".to_string()];
        let (columns, values) = assemble_row(&plan, &fields, 1, Utc::now(), 2).unwrap();
        assert_eq!(columns, vec!["name".to_string()]);
        assert_eq!(values, vec![Value::Text("Ada".into())]);
    }
}
