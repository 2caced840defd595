//! Distinct-value cache for filter controls.
//!
//! Option lists are computed once per column per scope and live until they
//! are explicitly cleared. Their lifetime is independent of cached pages:
//! invalidating results leaves option lists alone, and vice versa.

use std::cmp::Ordering;
use std::sync::Arc;

use gridfetch_core::{build_distinct, ClockSource, ColumnRegistry, Scope, Value};

use super::store::CacheStore;
use crate::error::SessionError;
use crate::executor::QueryExecutor;

/// Shared store of computed option lists, keyed by column key.
pub type DistinctStore = Arc<dyn CacheStore<String, Arc<DistinctValueSet>>>;

/// Sorted options of one filter control.
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctValueSet {
    pub column_key: String,
    pub values: Vec<Value>,
    /// Milliseconds since epoch, from the cache's clock.
    pub computed_at: u64,
}

/// Distinct-value cache bound to one scope.
pub struct DistinctValueCache {
    scope: Scope,
    store: DistinctStore,
    clock: Arc<dyn ClockSource>,
    limit: usize,
}

impl DistinctValueCache {
    #[must_use]
    pub fn new(
        scope: Scope,
        store: DistinctStore,
        clock: Arc<dyn ClockSource>,
        limit: usize,
    ) -> Self {
        Self {
            scope,
            store,
            clock,
            limit,
        }
    }

    /// Options for the filter control of `key`, sorted case-insensitively.
    ///
    /// Unknown and non-filterable keys yield an empty list without querying.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DataSource`] if the executor fails; nothing is
    /// cached in that case.
    pub async fn get_distinct_values(
        &self,
        key: &str,
        registry: &ColumnRegistry,
        executor: &dyn QueryExecutor,
    ) -> Result<Vec<Value>, SessionError> {
        let Some(query) = build_distinct(key, registry, self.limit) else {
            tracing::debug!(scope = %self.scope, key, "no distinct values for unfilterable key");
            return Ok(Vec::new());
        };

        if let Some(set) = self.store.get(&self.scope, &key.to_string()) {
            metrics::counter!("gridfetch_distinct_cache_hits_total").increment(1);
            return Ok(set.values.clone());
        }

        metrics::counter!("gridfetch_distinct_cache_misses_total").increment(1);
        let mut values = executor
            .distinct_values(&query)
            .await
            .map_err(SessionError::DataSource)?;
        values.retain(|v| !v.is_null());
        values.sort_by(case_insensitive);
        values.dedup();
        values.truncate(self.limit);

        tracing::debug!(scope = %self.scope, key, count = values.len(), "distinct values computed");
        self.store.insert(
            &self.scope,
            key.to_string(),
            Arc::new(DistinctValueSet {
                column_key: key.to_string(),
                values: values.clone(),
                computed_at: self.clock.now(),
            }),
        );
        Ok(values)
    }

    /// Drops every cached option list of this scope.
    pub fn clear(&self) {
        self.store.invalidate_scope(&self.scope);
        tracing::debug!(scope = %self.scope, "distinct value cache cleared");
    }
}

/// Text order ignoring case; numbers and other kinds keep their natural order.
fn case_insensitive(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        _ => a.sort_cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

    use gridfetch_core::{
        ColumnConfig, RegistryHandle, RelationConfig, RelationKind, Row, SystemClock, TableConfig,
    };

    use super::*;
    use crate::cache::store::QuickCacheStore;
    use crate::executor::InMemoryExecutor;

    fn registry() -> RegistryHandle {
        ColumnRegistry::register(&TableConfig {
            model: "Order".to_string(),
            table: "orders".to_string(),
            primary_key: "id".to_string(),
            date_column: None,
            default_sort: None,
            relations: vec![RelationConfig {
                name: "customer".to_string(),
                table: "customers".to_string(),
                kind: RelationKind::BelongsTo,
                foreign_key: "customer_id".to_string(),
                owner_key: None,
            }],
            columns: vec![
                ColumnConfig::new("id"),
                ColumnConfig::new("status").filterable().typed("select"),
                ColumnConfig::new("note"),
                ColumnConfig::new("customer:name").filterable(),
            ],
        })
        .unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn executor() -> InMemoryExecutor {
        InMemoryExecutor::new()
            .with_table(
                "orders",
                vec![
                    row(&[("id", Value::Int(1)), ("status", Value::from("shipped"))]),
                    row(&[("id", Value::Int(2)), ("status", Value::from("Active"))]),
                    row(&[("id", Value::Int(3)), ("status", Value::Null)]),
                    row(&[("id", Value::Int(4)), ("status", Value::from("active"))]),
                ],
            )
            .with_table(
                "customers",
                vec![
                    row(&[("id", Value::Int(1)), ("name", Value::from("bob"))]),
                    row(&[("id", Value::Int(2)), ("name", Value::from("Alice"))]),
                ],
            )
    }

    fn cache(limit: usize) -> DistinctValueCache {
        DistinctValueCache::new(
            Scope::new("alice", "orders"),
            Arc::new(QuickCacheStore::new(16)),
            Arc::new(SystemClock),
            limit,
        )
    }

    #[tokio::test]
    async fn values_are_sorted_case_insensitively_without_nulls() {
        let values = cache(100)
            .get_distinct_values("status", &registry(), &executor())
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Value::from("Active"), Value::from("active"), Value::from("shipped")]
        );
    }

    #[tokio::test]
    async fn relation_columns_query_the_related_table() {
        let values = cache(100)
            .get_distinct_values("customer:name", &registry(), &executor())
            .await
            .unwrap();
        assert_eq!(values, vec![Value::from("Alice"), Value::from("bob")]);
    }

    #[tokio::test]
    async fn repeated_calls_fetch_once() {
        let cache = cache(100);
        let exec = executor();
        let registry = registry();
        for _ in 0..5 {
            cache.get_distinct_values("status", &registry, &exec).await.unwrap();
        }
        assert_eq!(exec.stats().distinct_calls, 1);
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let cache = cache(100);
        let exec = executor();
        let registry = registry();
        cache.get_distinct_values("status", &registry, &exec).await.unwrap();
        cache.clear();
        cache.get_distinct_values("status", &registry, &exec).await.unwrap();
        assert_eq!(exec.stats().distinct_calls, 2);
    }

    #[tokio::test]
    async fn unknown_and_unfilterable_keys_do_not_query() {
        let cache = cache(100);
        let exec = executor();
        let registry = registry();
        assert!(cache.get_distinct_values("ghost", &registry, &exec).await.unwrap().is_empty());
        assert!(cache.get_distinct_values("note", &registry, &exec).await.unwrap().is_empty());
        assert_eq!(exec.stats().distinct_calls, 0);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = cache(100);
        let exec = executor();
        let registry = registry();
        exec.fail_next("boom");
        assert!(cache.get_distinct_values("status", &registry, &exec).await.is_err());
        assert!(!cache.get_distinct_values("status", &registry, &exec).await.unwrap().is_empty());
        assert_eq!(exec.stats().distinct_calls, 2);
    }

    #[tokio::test]
    async fn computed_at_comes_from_the_clock() {
        struct Fixed(AtomicU64);
        impl ClockSource for Fixed {
            fn now(&self) -> u64 {
                self.0.load(AtomicOrdering::Relaxed)
            }
        }

        let store: DistinctStore = Arc::new(QuickCacheStore::new(16));
        let scope = Scope::new("alice", "orders");
        let cache = DistinctValueCache::new(
            scope.clone(),
            Arc::clone(&store),
            Arc::new(Fixed(AtomicU64::new(42))),
            100,
        );
        cache.get_distinct_values("status", &registry(), &executor()).await.unwrap();
        let set = store.get(&scope, &"status".to_string()).unwrap();
        assert_eq!(set.computed_at, 42);
        assert_eq!(set.column_key, "status");
    }
}
