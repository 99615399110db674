//! Store session capability consumed by the loader.
//!
//! The loader never talks to a wire protocol directly. It is handed a
//! [`SessionProvider`] whose [`StoreSession`] answers metadata probes,
//! prepares insert statements, and executes bound writes. Timeouts and
//! connection pooling belong to the implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{data::Value, error::StoreError, types::ColumnType};

/// Column layout of one insert: which columns a row binds, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InsertStatement {
    pub keyspace: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl InsertStatement {
    pub fn new(keyspace: &str, table: &str, columns: Vec<String>) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            columns,
        }
    }

    /// Statement text; also the statement cache key.
    pub fn cql(&self) -> String {
        let markers = vec!["?"; self.columns.len()].join(",");
        format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            self.keyspace,
            self.table,
            self.columns.join(","),
            markers
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub id: u64,
    pub text: String,
    pub statement: InsertStatement,
}

#[async_trait]
pub trait StoreSession: Send + Sync {
    async fn table_exists(&self, keyspace: &str, table: &str) -> Result<bool, StoreError>;

    /// Declared columns of a table in store order.
    async fn column_types(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Vec<(String, ColumnType)>, StoreError>;

    async fn prepare(&self, statement: &InsertStatement) -> Result<PreparedStatement, StoreError>;

    /// Executes one bound write; `values` line up with the statement columns.
    async fn execute(
        &self,
        prepared: &PreparedStatement,
        values: Vec<Value>,
    ) -> Result<(), StoreError>;
}

/// Lifecycle owner of a store session.
pub trait SessionProvider: Send + Sync {
    fn start(&self) -> Result<(), StoreError>;
    fn stop(&self);
    fn is_active(&self) -> bool;
    fn session(&self) -> Result<Arc<dyn StoreSession>, StoreError>;
}
