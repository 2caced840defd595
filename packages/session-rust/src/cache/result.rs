//! Result cache and invalidation controller.
//!
//! Maps `(scope, fingerprint)` to the page computed for that state. A hit
//! never touches the executor. Concurrent misses for the same key collapse
//! into one execution: the first caller runs the query while later callers
//! wait on the same in-flight lock and then read the stored entry.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gridfetch_core::{build, plan_relations, ClockSource, ColumnRegistry, InteractionState, Scope};
use serde::Serialize;
use tokio::sync::Mutex;

use super::fingerprint::Fingerprint;
use super::store::CacheStore;
use crate::error::{CacheCorruptionError, SessionError};
use crate::executor::{QueryExecutor, ResultRow};

/// Shared store of computed pages.
pub type ResultStore = Arc<dyn CacheStore<Fingerprint, Arc<CachedResult>>>;

/// In-flight computations, shared by every result cache of one factory.
pub type InflightTable = Arc<DashMap<(Scope, Fingerprint), Arc<InflightSlot>>>;

/// Lock shared by every caller currently resolving one `(scope, fingerprint)`.
#[derive(Debug, Default)]
pub struct InflightSlot {
    lock: Mutex<()>,
    /// Registered callers. Only changed while the table shard is locked.
    holders: AtomicUsize,
}

/// One caller's membership in an [`InflightSlot`].
///
/// Dropping it (on completion, failure, or cancellation of the caller's
/// future) deregisters the caller; the last one out removes the slot.
struct InflightRegistration {
    table: InflightTable,
    key: (Scope, Fingerprint),
    slot: Arc<InflightSlot>,
}

impl InflightRegistration {
    fn join(table: &InflightTable, key: (Scope, Fingerprint)) -> Self {
        let slot = {
            let entry = table.entry(key.clone()).or_default();
            entry.holders.fetch_add(1, Ordering::AcqRel);
            Arc::clone(entry.value())
        };
        Self {
            table: Arc::clone(table),
            key,
            slot,
        }
    }
}

impl Drop for InflightRegistration {
    fn drop(&mut self) {
        self.table.remove_if(&self.key, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && slot.holders.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}

/// Pagination summary of a cached page. The only part of a result that is
/// meant to be serialized or persisted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: u64,
    /// Last page number. At least 1, even for an empty result.
    pub last_page: u32,
}

impl PageMeta {
    #[must_use]
    pub fn new(page_number: u32, page_size: u32, total_count: u64) -> Self {
        let pages = total_count.div_ceil(u64::from(page_size.max(1)));
        Self {
            page_number,
            page_size,
            total_count,
            last_page: u32::try_from(pages).unwrap_or(u32::MAX).max(1),
        }
    }
}

/// One computed page.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub fingerprint: Fingerprint,
    pub rows: Vec<ResultRow>,
    pub total_count: u64,
    pub relations_loaded: BTreeSet<String>,
    /// Milliseconds since epoch, from the cache's clock.
    pub created_at: u64,
    pub page_number: u32,
    pub page_size: u32,
}

impl CachedResult {
    #[must_use]
    pub fn meta(&self) -> PageMeta {
        PageMeta::new(self.page_number, self.page_size, self.total_count)
    }

    /// Whether the entry is older than `ttl_ms`. A TTL of 0 never expires.
    #[must_use]
    pub fn is_expired(&self, now: u64, ttl_ms: u64) -> bool {
        ttl_ms > 0 && now.saturating_sub(self.created_at) >= ttl_ms
    }

    /// Structural checks run on every read.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency between the entry and the request it is
    /// about to answer.
    pub fn validate(
        &self,
        fingerprint: Fingerprint,
        state: &InteractionState,
        plan: &BTreeSet<String>,
    ) -> Result<(), CacheCorruptionError> {
        if self.fingerprint != fingerprint {
            return Err(CacheCorruptionError::FingerprintMismatch {
                expected: fingerprint.to_hex(),
                stored: self.fingerprint.to_hex(),
            });
        }
        if self.page_number != state.page_number() || self.page_size != state.page_size() {
            return Err(CacheCorruptionError::PageMismatch {
                page: state.page_number(),
                size: state.page_size(),
                stored_page: self.page_number,
                stored_size: self.page_size,
            });
        }
        if self.rows.len() > usize::try_from(self.page_size).unwrap_or(usize::MAX) {
            return Err(CacheCorruptionError::Oversized {
                rows: self.rows.len(),
                size: self.page_size,
            });
        }
        if u64::try_from(self.rows.len()).unwrap_or(u64::MAX) > self.total_count {
            return Err(CacheCorruptionError::CountBelowRows {
                rows: self.rows.len(),
                total: self.total_count,
            });
        }
        if &self.relations_loaded != plan {
            return Err(CacheCorruptionError::RelationsMismatch {
                planned: plan.clone(),
                loaded: self.relations_loaded.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResultCache
// ---------------------------------------------------------------------------

/// Page cache bound to one scope.
pub struct ResultCache {
    scope: Scope,
    store: ResultStore,
    inflight: InflightTable,
    clock: Arc<dyn ClockSource>,
    ttl_ms: u64,
}

impl ResultCache {
    #[must_use]
    pub fn new(
        scope: Scope,
        store: ResultStore,
        inflight: InflightTable,
        clock: Arc<dyn ClockSource>,
        ttl_ms: u64,
    ) -> Self {
        Self {
            scope,
            store,
            inflight,
            clock,
            ttl_ms,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the page for `state`, running the executor only on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DataSource`] if the executor fails. Failures
    /// are not cached and leave existing entries untouched.
    pub async fn get_or_compute(
        &self,
        state: &InteractionState,
        visible: &BTreeSet<String>,
        registry: &ColumnRegistry,
        executor: &dyn QueryExecutor,
    ) -> Result<Arc<CachedResult>, SessionError> {
        let plan = plan_relations(visible, state.filter_column(), registry);
        let searchable: BTreeSet<String> = visible
            .iter()
            .filter(|key| registry.is_searchable(key))
            .cloned()
            .collect();
        let fingerprint = Fingerprint::compute(registry.model(), state, &plan, &searchable)?;

        if let Some(hit) = self.lookup(fingerprint, state, &plan) {
            metrics::counter!("gridfetch_result_cache_hits_total").increment(1);
            tracing::debug!(scope = %self.scope, %fingerprint, "result cache hit");
            return Ok(hit);
        }

        let registration =
            InflightRegistration::join(&self.inflight, (self.scope.clone(), fingerprint));
        let _running = registration.slot.lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.lookup(fingerprint, state, &plan) {
            metrics::counter!("gridfetch_result_cache_hits_total").increment(1);
            tracing::debug!(scope = %self.scope, %fingerprint, "result computed by concurrent caller");
            return Ok(hit);
        }

        metrics::counter!("gridfetch_result_cache_misses_total").increment(1);
        self.compute(fingerprint, state, visible, &plan, registry, executor).await
    }

    /// Drops every cached page of this scope.
    pub fn invalidate(&self) {
        self.store.invalidate_scope(&self.scope);
        metrics::counter!("gridfetch_result_cache_invalidations_total").increment(1);
        tracing::info!(scope = %self.scope, "result cache invalidated");
    }

    fn lookup(
        &self,
        fingerprint: Fingerprint,
        state: &InteractionState,
        plan: &BTreeSet<String>,
    ) -> Option<Arc<CachedResult>> {
        let entry = self.store.get(&self.scope, &fingerprint)?;

        if entry.is_expired(self.clock.now(), self.ttl_ms) {
            self.store.remove(&self.scope, &fingerprint);
            metrics::counter!("gridfetch_result_cache_expired_total").increment(1);
            tracing::debug!(scope = %self.scope, %fingerprint, "result cache entry expired");
            return None;
        }

        if let Err(err) = entry.validate(fingerprint, state, plan) {
            self.store.remove(&self.scope, &fingerprint);
            metrics::counter!("gridfetch_result_cache_corrupt_total").increment(1);
            tracing::warn!(scope = %self.scope, %fingerprint, error = %err, "discarding corrupt cache entry");
            return None;
        }

        Some(entry)
    }

    async fn compute(
        &self,
        fingerprint: Fingerprint,
        state: &InteractionState,
        visible: &BTreeSet<String>,
        plan: &BTreeSet<String>,
        registry: &ColumnRegistry,
        executor: &dyn QueryExecutor,
    ) -> Result<Arc<CachedResult>, SessionError> {
        let generation = self.store.generation(&self.scope);
        let spec = build(state, visible, plan, registry);

        metrics::counter!("gridfetch_executor_runs_total").increment(1);
        let output = executor.run(&spec).await.map_err(|err| {
            metrics::counter!("gridfetch_executor_failures_total").increment(1);
            tracing::error!(scope = %self.scope, model = %spec.model, error = %err, "query execution failed");
            SessionError::DataSource(err)
        })?;

        let result = Arc::new(CachedResult {
            fingerprint,
            rows: output.rows,
            total_count: output.total_count,
            relations_loaded: output.relations_loaded,
            created_at: self.clock.now(),
            page_number: state.page_number(),
            page_size: state.page_size(),
        });

        let stored = self
            .store
            .insert_at(&self.scope, generation, fingerprint, Arc::clone(&result));
        tracing::debug!(
            scope = %self.scope,
            %fingerprint,
            rows = result.rows.len(),
            total = result.total_count,
            stored,
            "result computed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    use gridfetch_core::{ColumnConfig, RegistryHandle, TableConfig, Value};

    use super::*;
    use crate::cache::store::QuickCacheStore;
    use crate::executor::InMemoryExecutor;

    struct ManualClock(AtomicU64);

    impl ClockSource for ManualClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn registry() -> RegistryHandle {
        ColumnRegistry::register(&TableConfig {
            model: "Order".to_string(),
            table: "orders".to_string(),
            primary_key: "id".to_string(),
            date_column: None,
            default_sort: None,
            relations: vec![],
            columns: vec![ColumnConfig::new("id").sortable(), ColumnConfig::new("name").searchable()],
        })
        .unwrap()
    }

    fn executor() -> InMemoryExecutor {
        let rows = (1..=3)
            .map(|id| {
                [
                    ("id".to_string(), Value::Int(id)),
                    ("name".to_string(), Value::from(format!("n{id}"))),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        InMemoryExecutor::new().with_table("orders", rows)
    }

    fn cache(store: &ResultStore, clock: Arc<ManualClock>, ttl_ms: u64) -> ResultCache {
        ResultCache::new(
            Scope::new("alice", "orders"),
            Arc::clone(store),
            InflightTable::default(),
            clock,
            ttl_ms,
        )
    }

    fn visible() -> BTreeSet<String> {
        ["id", "name"].iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn page_meta_rounds_up_and_has_at_least_one_page() {
        assert_eq!(PageMeta::new(1, 10, 25).last_page, 3);
        assert_eq!(PageMeta::new(1, 10, 20).last_page, 2);
        assert_eq!(PageMeta::new(1, 10, 0).last_page, 1);
    }

    #[test]
    fn page_meta_serializes_camel_case() {
        let json = serde_json::to_value(PageMeta::new(2, 10, 25)).unwrap();
        assert_eq!(json["pageNumber"], 2);
        assert_eq!(json["lastPage"], 3);
        assert_eq!(json["totalCount"], 25);
    }

    #[tokio::test]
    async fn second_call_is_a_hit() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let cache = cache(&store, Arc::new(ManualClock(AtomicU64::new(1))), 0);
        let exec = executor();
        let registry = registry();
        let state = InteractionState::new();

        let first = cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        let second = cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(exec.stats().run_calls, 1);
        assert_eq!(first.total_count, 3);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let clock = Arc::new(ManualClock(AtomicU64::new(1_000)));
        let cache = cache(&store, Arc::clone(&clock), 500);
        let exec = executor();
        let registry = registry();
        let state = InteractionState::new();

        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        clock.0.store(1_499, Ordering::Relaxed);
        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        assert_eq!(exec.stats().run_calls, 1);

        clock.0.store(1_500, Ordering::Relaxed);
        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        assert_eq!(exec.stats().run_calls, 2);
    }

    #[tokio::test]
    async fn corrupt_entry_is_treated_as_a_miss() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let cache = cache(&store, Arc::new(ManualClock(AtomicU64::new(1))), 0);
        let exec = executor();
        let registry = registry();
        let state = InteractionState::new();

        let good = cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        let mut bad = (*good).clone();
        bad.total_count = 0;
        store.insert(cache.scope(), good.fingerprint, Arc::new(bad));

        let recomputed = cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        assert_eq!(recomputed.total_count, 3);
        assert_eq!(exec.stats().run_calls, 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let cache = cache(&store, Arc::new(ManualClock(AtomicU64::new(1))), 0);
        let exec = executor();
        let registry = registry();
        let state = InteractionState::new();

        exec.fail_next("timeout");
        let err = cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap_err();
        assert!(matches!(err, SessionError::DataSource(_)));
        assert!(store.is_empty());

        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        assert_eq!(exec.stats().run_calls, 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let cache = cache(&store, Arc::new(ManualClock(AtomicU64::new(1))), 0);
        let exec = executor();
        let registry = registry();
        let state = InteractionState::new();

        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        cache.invalidate();
        cache.get_or_compute(&state, &visible(), &registry, &exec).await.unwrap();
        assert_eq!(exec.stats().run_calls, 2);
    }

    fn shared_cache(store: &ResultStore, inflight: &InflightTable) -> ResultCache {
        ResultCache::new(
            Scope::new("alice", "orders"),
            Arc::clone(store),
            Arc::clone(inflight),
            Arc::new(ManualClock(AtomicU64::new(1))),
            0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_misses_release_their_inflight_slot() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let inflight = InflightTable::default();
        let cache = shared_cache(&store, &inflight);
        let exec = executor().with_latency(Duration::from_millis(100));
        let registry = registry();

        for page in 1..=20 {
            let mut state = InteractionState::new();
            state.set_page(page);
            let attempt = tokio::time::timeout(
                Duration::from_millis(10),
                cache.get_or_compute(&state, &visible(), &registry, &exec),
            )
            .await;
            assert!(attempt.is_err());
        }

        assert!(inflight.is_empty());
        assert!(store.is_empty());
        cache
            .get_or_compute(&InteractionState::new(), &visible(), &registry, &exec)
            .await
            .unwrap();
        assert!(inflight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_keep_collapsing_after_the_leader_fails() {
        let store: ResultStore = Arc::new(QuickCacheStore::new(16));
        let inflight = InflightTable::default();
        let cache = shared_cache(&store, &inflight);
        let exec = executor().with_latency(Duration::from_millis(50));
        let registry = registry();
        let state = InteractionState::new();
        exec.fail_next("connection reset");

        let leader_visible = visible();
        let waiter_visible = visible();
        let leader = cache.get_or_compute(&state, &leader_visible, &registry, &exec);
        let waiter = cache.get_or_compute(&state, &waiter_visible, &registry, &exec);
        let late = async {
            // Arrives after the leader failed, while the waiter is running.
            tokio::time::sleep(Duration::from_millis(60)).await;
            cache.get_or_compute(&state, &visible(), &registry, &exec).await
        };
        let (leader, waiter, late) = tokio::join!(leader, waiter, late);

        assert!(leader.is_err());
        assert!(Arc::ptr_eq(&waiter.unwrap(), &late.unwrap()));
        assert_eq!(exec.stats().run_calls, 2);
        assert!(inflight.is_empty());
    }

    #[test]
    fn ttl_zero_never_expires() {
        let result = CachedResult {
            fingerprint: Fingerprint::compute(
                "Order",
                &InteractionState::new(),
                &BTreeSet::new(),
                &BTreeSet::new(),
            )
            .unwrap(),
            rows: vec![],
            total_count: 0,
            relations_loaded: BTreeSet::new(),
            created_at: 0,
            page_number: 1,
            page_size: 10,
        };
        assert!(!result.is_expired(u64::MAX, 0));
        assert!(result.is_expired(100, 100));
    }
}
