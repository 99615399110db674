//! Prepared-statement cache keyed by statement text.

use std::{num::NonZeroUsize, sync::Arc};

use log::debug;
use lru::LruCache;

use crate::{
    error::StoreError,
    session::{InsertStatement, PreparedStatement, StoreSession},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Bounded LRU of prepared inserts. Each distinct statement text is prepared
/// once for as long as it stays resident.
pub struct StatementCache {
    lru: LruCache<String, Arc<PreparedStatement>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("entries", &self.lru.len())
            .field("capacity", &self.lru.cap())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub async fn get_or_prepare(
        &mut self,
        session: &dyn StoreSession,
        statement: &InsertStatement,
    ) -> Result<Arc<PreparedStatement>, StoreError> {
        let key = statement.cql();
        if let Some(prepared) = self.lru.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(prepared));
        }
        self.misses += 1;
        debug!("Statement cache miss for {key}");
        let prepared = Arc::new(session.prepare(statement).await?);
        if let Some((evicted, _)) = self.lru.push(key, Arc::clone(&prepared)) {
            if evicted != prepared.text {
                self.evictions += 1;
                debug!("Evicted prepared statement {evicted}");
            }
        }
        Ok(prepared)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.lru.len(),
        }
    }
}
