//! In-process store session.
//!
//! [`MemoryStore`] implements [`StoreSession`] over a table catalog loaded
//! from YAML. It checks every write against the declared column types, keeps
//! the accepted rows, and records a log of prepare/issue/complete events so
//! callers can inspect how writes were scheduled.
//!
//! ```yaml
//! keyspaces:
//!   demo:
//!     people:
//!       columns:
//!         - name: name
//!           type: text
//!         - name: tags
//!           type: set<text>
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    case_fold::fold,
    data::Value,
    error::StoreError,
    session::{InsertStatement, PreparedStatement, SessionProvider, StoreSession},
    types::ColumnType,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub keyspaces: BTreeMap<String, BTreeMap<String, TableDefinition>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDefinition {
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: ColumnType,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening catalog file {path:?}"))?;
        let reader = BufReader::new(file);
        let catalog = serde_yaml::from_reader(reader).context("Parsing catalog YAML")?;
        Ok(catalog)
    }

    /// Adds or replaces a table definition.
    pub fn with_table(
        mut self,
        keyspace: &str,
        table: &str,
        columns: &[(&str, ColumnType)],
    ) -> Self {
        let definition = TableDefinition {
            columns: columns
                .iter()
                .map(|(name, datatype)| ColumnDefinition {
                    name: name.to_string(),
                    datatype: datatype.clone(),
                })
                .collect(),
        };
        self.keyspaces
            .entry(keyspace.to_string())
            .or_default()
            .insert(table.to_string(), definition);
        self
    }

    fn keyspace(&self, keyspace: &str) -> Option<&BTreeMap<String, TableDefinition>> {
        let wanted = fold(keyspace);
        self.keyspaces
            .iter()
            .find(|(name, _)| fold(name) == wanted)
            .map(|(_, tables)| tables)
    }

    fn table(&self, keyspace: &str, table: &str) -> Result<&TableDefinition, StoreError> {
        let tables = self
            .keyspace(keyspace)
            .ok_or_else(|| StoreError::UnknownKeyspace(keyspace.to_string()))?;
        let wanted = fold(table);
        tables
            .iter()
            .find(|(name, _)| fold(name) == wanted)
            .map(|(_, definition)| definition)
            .ok_or_else(|| StoreError::UnknownTable {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Prepared(String),
    Issued(u64),
    Completed(u64),
}

pub type StoredRow = Vec<(String, Value)>;

#[derive(Debug, Default)]
struct StoreState {
    rows: BTreeMap<(String, String), Vec<StoredRow>>,
    events: Vec<StoreEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Catalog,
    state: Mutex<StoreState>,
    next_statement: AtomicU64,
    next_write: AtomicU64,
    prepare_calls: AtomicUsize,
    fail_write: Option<u64>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Makes the `nth` write (1-based, in issue order) fail.
    pub fn with_write_failure(mut self, nth: u64) -> Self {
        self.fail_write = Some(nth);
        self
    }

    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<StoredRow> {
        self.lock()
            .rows
            .get(&(fold(keyspace), fold(table)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: StoreEvent) {
        self.lock().events.push(event);
    }

    fn check_row(&self, statement: &InsertStatement, values: &[Value]) -> Result<(), StoreError> {
        if statement.columns.len() != values.len() {
            return Err(StoreError::Rejected(format!(
                "{} bind marker(s) but {} value(s)",
                statement.columns.len(),
                values.len()
            )));
        }
        let definition = self.catalog.table(&statement.keyspace, &statement.table)?;
        for (column, value) in statement.columns.iter().zip(values) {
            let declared = definition
                .columns
                .iter()
                .find(|c| fold(&c.name) == fold(column))
                .ok_or_else(|| StoreError::Rejected(format!("Undefined column '{column}'")))?;
            if !value.fits(&declared.datatype) {
                return Err(StoreError::Rejected(format!(
                    "Value '{value}' does not fit column '{column}' of type {}",
                    declared.datatype
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreSession for MemoryStore {
    async fn table_exists(&self, keyspace: &str, table: &str) -> Result<bool, StoreError> {
        Ok(self.catalog.table(keyspace, table).is_ok())
    }

    async fn column_types(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Vec<(String, ColumnType)>, StoreError> {
        let definition = self.catalog.table(keyspace, table)?;
        Ok(definition
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.datatype.clone()))
            .collect())
    }

    async fn prepare(&self, statement: &InsertStatement) -> Result<PreparedStatement, StoreError> {
        self.catalog.table(&statement.keyspace, &statement.table)?;
        self.prepare_calls.fetch_add(1, Ordering::Relaxed);
        let text = statement.cql();
        debug!("Preparing {text}");
        self.record(StoreEvent::Prepared(text.clone()));
        Ok(PreparedStatement {
            id: self.next_statement.fetch_add(1, Ordering::Relaxed) + 1,
            text,
            statement: statement.clone(),
        })
    }

    async fn execute(
        &self,
        prepared: &PreparedStatement,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        let seq = self.next_write.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(StoreEvent::Issued(seq));
        tokio::task::yield_now().await;

        if self.fail_write == Some(seq) {
            return Err(StoreError::WriteFailed(format!(
                "Injected failure on write {seq}"
            )));
        }
        let statement = &prepared.statement;
        self.check_row(statement, &values)?;
        let row: StoredRow = statement.columns.iter().cloned().zip(values).collect();
        let mut state = self.lock();
        state
            .rows
            .entry((fold(&statement.keyspace), fold(&statement.table)))
            .or_default()
            .push(row);
        state.events.push(StoreEvent::Completed(seq));
        Ok(())
    }
}

/// Session lifecycle around a shared [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySessionProvider {
    store: Arc<MemoryStore>,
    active: AtomicBool,
}

impl MemorySessionProvider {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            active: AtomicBool::new(false),
        }
    }
}

impl SessionProvider for MemorySessionProvider {
    fn start(&self) -> Result<(), StoreError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn session(&self) -> Result<Arc<dyn StoreSession>, StoreError> {
        if !self.is_active() {
            return Err(StoreError::Inactive);
        }
        let session: Arc<dyn StoreSession> = self.store.clone();
        Ok(session)
    }
}
