//! Factory for scope-bound caches over shared stores.
//!
//! One [`CacheFactory`] per process owns the bounded stores and the in-flight
//! table. Each table session asks it for a [`ResultCache`] and a
//! [`DistinctValueCache`] bound to the session's scope, so sessions of
//! different users share capacity but never entries.

use std::sync::Arc;

use gridfetch_core::{ClockSource, Scope, SystemClock};

use super::distinct::{DistinctStore, DistinctValueCache};
use super::result::{InflightTable, ResultCache, ResultStore};
use super::store::QuickCacheStore;
use crate::config::CacheConfig;

/// Creates scope-bound caches that share one set of stores.
pub struct CacheFactory {
    config: CacheConfig,
    results: ResultStore,
    distinct: DistinctStore,
    inflight: InflightTable,
    clock: Arc<dyn ClockSource>,
}

impl CacheFactory {
    /// Creates a factory with `quick_cache` stores sized by `config` and the
    /// system clock.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with an injected clock.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn ClockSource>) -> Self {
        let results: ResultStore = Arc::new(QuickCacheStore::new(config.max_result_entries));
        let distinct: DistinctStore = Arc::new(QuickCacheStore::new(config.max_distinct_entries));
        Self::with_stores(config, clock, results, distinct)
    }

    /// Creates a factory over caller-supplied stores.
    #[must_use]
    pub fn with_stores(
        config: CacheConfig,
        clock: Arc<dyn ClockSource>,
        results: ResultStore,
        distinct: DistinctStore,
    ) -> Self {
        Self {
            config,
            results,
            distinct,
            inflight: InflightTable::default(),
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Result cache for `scope`.
    #[must_use]
    pub fn result_cache(&self, scope: Scope) -> ResultCache {
        ResultCache::new(
            scope,
            Arc::clone(&self.results),
            Arc::clone(&self.inflight),
            Arc::clone(&self.clock),
            self.config.result_ttl_ms,
        )
    }

    /// Distinct-value cache for `scope`, returning at most `limit` options per
    /// column.
    #[must_use]
    pub fn distinct_cache(&self, scope: Scope, limit: usize) -> DistinctValueCache {
        DistinctValueCache::new(
            scope,
            Arc::clone(&self.distinct),
            Arc::clone(&self.clock),
            limit,
        )
    }
}

impl Default for CacheFactory {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
