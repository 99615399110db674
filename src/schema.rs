//! Target-table introspection.
//!
//! Both probes run once per load, before the first row is read; nothing in
//! the streaming loop touches store metadata again.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    case_fold::fold,
    error::{LoadError, LoadResult},
    session::StoreSession,
    types::ColumnType,
};

/// Declared column types keyed by lower-cased column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypeMap {
    columns: BTreeMap<String, (String, ColumnType)>,
}

impl ColumnTypeMap {
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, ty)| {
                let name = name.into();
                (fold(&name), (name, ty))
            })
            .collect();
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnType> {
        self.columns.get(&fold(column)).map(|(_, ty)| ty)
    }

    /// Store spelling of `column`, if the table has it.
    pub fn canonical_name(&self, column: &str) -> Option<&str> {
        self.columns
            .get(&fold(column))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub struct SchemaIntrospector<'a> {
    session: &'a dyn StoreSession,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(session: &'a dyn StoreSession) -> Self {
        Self { session }
    }

    pub async fn table_exists(&self, keyspace: &str, table: &str) -> LoadResult<bool> {
        Ok(self.session.table_exists(keyspace, table).await?)
    }

    pub async fn column_types(&self, keyspace: &str, table: &str) -> LoadResult<ColumnTypeMap> {
        let columns = self.session.column_types(keyspace, table).await?;
        debug!(
            "Table {keyspace}.{table} declares {} column(s): {}",
            columns.len(),
            columns
                .iter()
                .map(|(name, ty)| format!("{name} {ty}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(ColumnTypeMap::from_columns(columns))
    }

    /// Fails with [`LoadError::Schema`] when the table is absent.
    pub async fn require_table(&self, keyspace: &str, table: &str) -> LoadResult<ColumnTypeMap> {
        if !self.table_exists(keyspace, table).await? {
            return Err(LoadError::Schema {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            });
        }
        self.column_types(keyspace, table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Catalog, MemoryStore};

    #[test]
    fn lookups_fold_case_but_keep_store_spelling() {
        let map = ColumnTypeMap::from_columns([("Loaded_At", ColumnType::Timestamp)]);
        assert_eq!(map.get("LOADED_AT"), Some(&ColumnType::Timestamp));
        assert_eq!(map.canonical_name("loaded_at"), Some("Loaded_At"));
        assert_eq!(map.get("missing"), None);
    }

    #[tokio::test]
    async fn require_table_reports_missing_tables() {
        let store = MemoryStore::new(
            Catalog::default().with_table("demo", "people", &[("name", ColumnType::Text)]),
        );
        let introspector = SchemaIntrospector::new(&store);
        let types = introspector.require_table("demo", "people").await.unwrap();
        assert_eq!(types.len(), 1);

        let err = introspector.require_table("demo", "pets").await.unwrap_err();
        assert!(matches!(err, LoadError::Schema { ref table, .. } if table == "pets"));
    }
}
