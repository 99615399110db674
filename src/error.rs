use thiserror::Error;

use crate::types::ColumnType;

/// A cell that could not be coerced into its column's declared type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Failed to parse '{text}' as {target}: {reason}")]
    Invalid {
        text: String,
        target: ColumnType,
        reason: String,
    },
    #[error(
        "Column type {target} is not supported (value '{text}'); loadable types are {}",
        ColumnType::variants().join(", ")
    )]
    Unsupported { text: String, target: ColumnType },
}

impl ConversionError {
    pub(crate) fn invalid(text: &str, target: &ColumnType, reason: impl ToString) -> Self {
        ConversionError::Invalid {
            text: text.to_string(),
            target: target.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ConversionError::Invalid { text, .. } | ConversionError::Unsupported { text, .. } => {
                text
            }
        }
    }

    pub fn target(&self) -> &ColumnType {
        match self {
            ConversionError::Invalid { target, .. }
            | ConversionError::Unsupported { target, .. } => target,
        }
    }
}

/// Failures reported by a store session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session is not active")]
    Inactive,
    #[error("Keyspace '{0}' does not exist")]
    UnknownKeyspace(String),
    #[error("Table {keyspace}.{table} does not exist")]
    UnknownTable { keyspace: String, table: String },
    #[error("Statement rejected: {0}")]
    Rejected(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Mapping plan has {} problem(s):\n  - {}", .0.len(), .0.join("\n  - "))]
    MappingPlan(Vec<String>),
    #[error("Table {keyspace}.{table} does not exist")]
    Schema { keyspace: String, table: String },
    #[error("Line {line}, column '{column}': {source}")]
    TypeConversion {
        line: usize,
        column: String,
        #[source]
        source: ConversionError,
    },
    #[error("Write rejected by store: {0}")]
    Write(#[from] StoreError),
    #[error("Input error: {0}")]
    Input(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Context recorded when a streaming run aborts.
#[derive(Debug, Error)]
#[error(
    "Load aborted at line {line}{} after {inserted} row(s) inserted: {error}",
    .field.map(|field| format!(", field {field}")).unwrap_or_default()
)]
pub struct RunFailure {
    /// Best-known 1-based line of the input file.
    pub line: usize,
    /// Best-known 1-based field position within that line.
    pub field: Option<usize>,
    pub inserted: u64,
    #[source]
    pub error: LoadError,
}
