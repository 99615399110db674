//! Column planning.
//!
//! [`plan`] reconciles the input headers, the resolved mapping, and the
//! table's declared columns into an ordered [`ColumnPlan`]. Every planned
//! column has exactly one source. Problems are collected rather than raised
//! one at a time, so a single run reports every correction the mapping
//! needs.
//!
//! Assembly order:
//!
//! 1. headers with an explicit mapping entry, in header order;
//! 2. unmapped headers that case-insensitively name a table column
//!    (non-strict mode only);
//! 3. synthetic columns;
//! 4. timestamp columns;
//! 5. line-number columns;
//! 6. uuid columns.

use log::{debug, warn};

use crate::{
    case_fold::CaseFoldSet,
    data::{Value, convert},
    error::{LoadError, LoadResult},
    mapping::{MappingCategory, MappingConfiguration},
    schema::ColumnTypeMap,
    types::ColumnType,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    /// Cell at `index` of each row; `fallback` is used when the cell is blank.
    Header {
        header: String,
        index: usize,
        auto_matched: bool,
        fallback: Option<Value>,
    },
    Synthetic {
        literal: String,
        value: Option<Value>,
    },
    Timestamp,
    LineNumber,
    Uuid,
}

impl ColumnSource {
    pub fn category(&self) -> MappingCategory {
        match self {
            ColumnSource::Header { .. } => MappingCategory::Header,
            ColumnSource::Synthetic { .. } => MappingCategory::Synthetic,
            ColumnSource::Timestamp => MappingCategory::Timestamp,
            ColumnSource::LineNumber => MappingCategory::LineNumber,
            ColumnSource::Uuid => MappingCategory::Uuid,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ColumnSource::Header {
                header,
                index,
                auto_matched,
                fallback,
            } => {
                let mut text = format!("header '{header}' (field {})", index + 1);
                if *auto_matched {
                    text.push_str(", auto-matched");
                }
                if let Some(fallback) = fallback {
                    text.push_str(&format!(", default '{fallback}'"));
                }
                text
            }
            ColumnSource::Synthetic { literal, .. } => format!("synthetic '{literal}'"),
            ColumnSource::Timestamp => "run timestamp".to_string(),
            ColumnSource::LineNumber => "line number".to_string(),
            ColumnSource::Uuid => "random uuid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub source: ColumnSource,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPlan {
    columns: Vec<PlannedColumn>,
    auto_matched: Vec<(String, String)>,
    skipped_headers: Vec<String>,
}

impl ColumnPlan {
    #[cfg(test)]
    pub(crate) fn from_columns(columns: Vec<PlannedColumn>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn columns(&self) -> &[PlannedColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `(header, column)` pairs resolved by name matching.
    pub fn auto_matched(&self) -> &[(String, String)] {
        &self.auto_matched
    }

    pub fn skipped_headers(&self) -> &[String] {
        &self.skipped_headers
    }

    /// `[column, type, source]` rows for display.
    pub fn describe(&self) -> Vec<Vec<String>> {
        self.columns
            .iter()
            .map(|c| vec![c.name.clone(), c.column_type.to_string(), c.source.describe()])
            .collect()
    }
}

pub fn plan(
    headers: &[String],
    mapping: &MappingConfiguration,
    types: &ColumnTypeMap,
) -> LoadResult<ColumnPlan> {
    let mut planner = Planner {
        mapping,
        types,
        claimed: CaseFoldSet::new(),
        plan: ColumnPlan::default(),
        problems: Vec::new(),
    };
    planner.mapped_headers(headers);
    planner.unmapped_headers(headers);
    planner.synthetics();
    planner.generated(mapping.timestamps(), ColumnSource::Timestamp);
    planner.generated(mapping.linenumbers(), ColumnSource::LineNumber);
    planner.generated(mapping.uuids(), ColumnSource::Uuid);
    planner.finish()
}

struct Planner<'a> {
    mapping: &'a MappingConfiguration,
    types: &'a ColumnTypeMap,
    claimed: CaseFoldSet,
    plan: ColumnPlan,
    problems: Vec<String>,
}

impl Planner<'_> {
    fn mapped_headers(&mut self, headers: &[String]) {
        let mapping = self.mapping;
        let mut present = CaseFoldSet::new();
        for (index, header) in headers.iter().enumerate() {
            present.insert(header.as_str());
            let Some(column) = mapping.header_column(header) else {
                continue;
            };
            if mapping.is_ignored(header) {
                warn!("Header '{header}' is both mapped and ignored; ignoring it");
                continue;
            }
            let Some((name, column_type)) = self.lookup(column) else {
                self.problems.push(format!(
                    "Header '{header}' is mapped to column '{column}', which table '{}' does not define",
                    mapping.table()
                ));
                continue;
            };
            self.claim_header(header, index, name, column_type, false);
        }
        for (header, _) in mapping.header_mappings() {
            if !present.contains(header) {
                warn!("Mapped header '{header}' does not appear in the input");
            }
        }
    }

    fn unmapped_headers(&mut self, headers: &[String]) {
        for (index, header) in headers.iter().enumerate() {
            if header.trim().is_empty() {
                debug!("Skipping blank header at field {}", index + 1);
                continue;
            }
            if self.mapping.header_column(header).is_some() || self.mapping.is_ignored(header) {
                continue;
            }
            if self.mapping.strict() {
                self.problems.push(format!(
                    "Header '{header}' has no mapping and strict mapping is enabled"
                ));
                continue;
            }
            match self.lookup(header) {
                Some((name, column_type)) if !self.claimed.contains(&name) => {
                    debug!("Auto-matched header '{header}' to column '{name}'");
                    self.plan.auto_matched.push((header.clone(), name.clone()));
                    self.claim_header(header, index, name, column_type, true);
                }
                _ => {
                    debug!("Header '{header}' matches no unclaimed column; skipping it");
                    self.plan.skipped_headers.push(header.clone());
                }
            }
        }
    }

    fn claim_header(
        &mut self,
        header: &str,
        index: usize,
        name: String,
        column_type: ColumnType,
        auto_matched: bool,
    ) {
        if !self.claimed.insert(name.as_str()) {
            self.problems.push(format!(
                "Column '{name}' is claimed more than once (again by header '{header}')"
            ));
            return;
        }
        let mapping = self.mapping;
        let fallback = mapping
            .synthetic(&name)
            .and_then(|literal| self.convert_literal(&name, literal, &column_type));
        self.plan.columns.push(PlannedColumn {
            name,
            column_type,
            source: ColumnSource::Header {
                header: header.to_string(),
                index,
                auto_matched,
                fallback,
            },
        });
    }

    fn synthetics(&mut self) {
        let mapping = self.mapping;
        for (column, literal) in mapping.synthetics() {
            if self.claimed.contains(column) {
                continue;
            }
            let Some((name, column_type)) = self.lookup(column) else {
                self.missing_column(MappingCategory::Synthetic, column);
                continue;
            };
            let value = self.convert_literal(&name, literal, &column_type);
            self.claimed.insert(name.as_str());
            self.plan.columns.push(PlannedColumn {
                name,
                column_type,
                source: ColumnSource::Synthetic {
                    literal: literal.clone(),
                    value,
                },
            });
        }
    }

    fn generated(&mut self, columns: &[String], source: ColumnSource) {
        let category = source.category();
        for column in columns {
            if self.claimed.contains(column) {
                debug!("Column '{column}' is already sourced from the input; not generating it");
                continue;
            }
            let Some((name, column_type)) = self.lookup(column) else {
                self.missing_column(category, column);
                continue;
            };
            if !generated_type_supported(&source, &column_type) {
                self.problems.push(format!(
                    "Column '{name}' in {category} has type {column_type}, which cannot hold a generated {}",
                    source.describe()
                ));
                continue;
            }
            self.claimed.insert(name.as_str());
            self.plan.columns.push(PlannedColumn {
                name,
                column_type,
                source: source.clone(),
            });
        }
    }

    fn lookup(&self, column: &str) -> Option<(String, ColumnType)> {
        let name = self.types.canonical_name(column)?;
        let column_type = self.types.get(column)?;
        Some((name.to_string(), column_type.clone()))
    }

    fn missing_column(&mut self, category: MappingCategory, column: &str) {
        self.problems.push(format!(
            "Column '{column}' in {category} does not exist in table '{}'",
            self.mapping.table()
        ));
    }

    fn convert_literal(&mut self, name: &str, literal: &str, ty: &ColumnType) -> Option<Value> {
        match convert(literal, ty) {
            Ok(value) => value,
            Err(err) => {
                self.problems
                    .push(format!("Synthetic value for column '{name}' is invalid: {err}"));
                None
            }
        }
    }

    fn finish(self) -> LoadResult<ColumnPlan> {
        if !self.problems.is_empty() {
            return Err(LoadError::MappingPlan(self.problems));
        }
        if self.plan.is_empty() {
            return Err(LoadError::MappingPlan(vec![format!(
                "No input header or generated column maps to table '{}'",
                self.mapping.table()
            )]));
        }
        Ok(self.plan)
    }
}

fn generated_type_supported(source: &ColumnSource, ty: &ColumnType) -> bool {
    let native = match source {
        ColumnSource::Timestamp => matches!(ty, ColumnType::Timestamp | ColumnType::BigInt),
        ColumnSource::LineNumber => matches!(
            ty,
            ColumnType::Int | ColumnType::BigInt | ColumnType::Varint | ColumnType::Decimal
        ),
        ColumnSource::Uuid => matches!(ty, ColumnType::Uuid),
        ColumnSource::Header { .. } | ColumnSource::Synthetic { .. } => true,
    };
    native || ty.is_text()
}
