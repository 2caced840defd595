//! Host-facing table session.
//!
//! A [`TableSession`] is the per-user, per-table component a reactive UI
//! talks to. Mutations only edit the interaction state and mark the session
//! dirty; data is fetched when the host asks for a page, and only if the
//! result cache cannot answer.
//!
//! Phases: `Idle → (mutation) → Dirty → get_page → {hit → Idle | miss →
//! Querying → Idle}`. Only `Querying` reaches the executor.

use std::collections::BTreeSet;
use std::sync::Arc;

use gridfetch_core::{
    plan_relations, FilterOperator, FilterValue, IdentityProvider, InteractionState,
    RegistryHandle, Scope, SortDirection, Value,
};

use crate::cache::{CacheFactory, CachedResult, DistinctValueCache, PageMeta, ResultCache};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::executor::QueryExecutor;

/// Lifecycle of a session's current state relative to its last served page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The last served page reflects the current state.
    Idle,
    /// The state changed since the last page was served.
    Dirty,
    /// A page request is in progress.
    Querying,
}

/// Interactive table bound to one scope.
pub struct TableSession {
    scope: Scope,
    registry: RegistryHandle,
    executor: Arc<dyn QueryExecutor>,
    results: ResultCache,
    distinct: DistinctValueCache,
    config: SessionConfig,
    state: InteractionState,
    visible: BTreeSet<String>,
    plan: BTreeSet<String>,
    phase: SessionPhase,
    last_result: Option<Arc<CachedResult>>,
}

impl TableSession {
    /// Creates a session showing every registered column.
    #[must_use]
    pub fn new(
        identity: &dyn IdentityProvider,
        registry: RegistryHandle,
        executor: Arc<dyn QueryExecutor>,
        factory: &CacheFactory,
        config: SessionConfig,
    ) -> Self {
        let scope = identity.scope();
        let mut state = InteractionState::new();
        state.set_page_size(config.default_page_size, config.max_page_size);
        let visible: BTreeSet<String> = registry.columns().iter().map(|c| c.key.clone()).collect();
        let plan = plan_relations(&visible, None, &registry);

        tracing::debug!(%scope, model = registry.model(), ?plan, "table session created");

        Self {
            results: factory.result_cache(scope.clone()),
            distinct: factory.distinct_cache(scope.clone(), config.distinct_value_limit),
            scope,
            registry,
            executor,
            config,
            state,
            visible,
            plan,
            phase: SessionPhase::Idle,
            last_result: None,
        }
    }

    // --- Accessors ---

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn visible_columns(&self) -> &BTreeSet<String> {
        &self.visible
    }

    /// Relations eager-loaded with every page for the current visibility and
    /// filter target.
    #[must_use]
    pub fn plan_relations(&self) -> &BTreeSet<String> {
        &self.plan
    }

    /// Pagination summary of the last page served, if any.
    #[must_use]
    pub fn page_meta(&self) -> Option<PageMeta> {
        self.last_result.as_ref().map(|r| r.meta())
    }

    // --- Mutations ---
    //
    // Each returns whether the state changed.

    pub fn set_search(&mut self, term: impl Into<String>) -> bool {
        let changed = self.state.set_search_term(term);
        self.apply(changed)
    }

    /// Selects the filter column, discarding the previous operator, value, and
    /// cached option lists.
    pub fn set_filter_column(&mut self, column: Option<String>) -> bool {
        let changed = self.state.set_filter_column(column);
        if changed {
            self.distinct.clear();
        }
        self.apply(changed)
    }

    pub fn set_filter_operator(&mut self, operator: Option<FilterOperator>) -> bool {
        let changed = self.state.set_filter_operator(operator);
        self.apply(changed)
    }

    pub fn set_filter_value(&mut self, value: Option<FilterValue>) -> bool {
        let changed = self.state.set_filter_value(value);
        self.apply(changed)
    }

    pub fn clear_filter(&mut self) -> bool {
        let changed = self.state.clear_filter();
        self.apply(changed)
    }

    pub fn set_date_range(&mut self, start: Option<String>, end: Option<String>) -> bool {
        let changed = self.state.set_date_range(start, end);
        self.apply(changed)
    }

    /// Header-click sort: toggles direction when `column` is already sorted.
    pub fn sort_by(&mut self, column: impl Into<String>) -> bool {
        let changed = self.state.sort_by(column);
        self.apply(changed)
    }

    pub fn set_sort(&mut self, column: Option<String>, direction: SortDirection) -> bool {
        let changed = self.state.set_sort(column, direction);
        self.apply(changed)
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        let changed = self.state.set_page(page);
        self.apply(changed)
    }

    /// Sets the page size, clamped to `1..=max_page_size`.
    pub fn set_page_size(&mut self, size: u32) -> bool {
        let changed = self.state.set_page_size(size, self.config.max_page_size);
        self.apply(changed)
    }

    /// Replaces the set of displayed columns. Affects search coverage and the
    /// eager-load plan.
    pub fn set_visible_columns<I, S>(&mut self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let visible: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if visible == self.visible {
            return false;
        }
        self.visible = visible;
        self.apply(true)
    }

    // --- Data ---

    /// The page for the current state, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DataSource`] if the executor fails. The session
    /// stays dirty and the next call retries.
    pub async fn get_page(&mut self) -> Result<Arc<CachedResult>, SessionError> {
        self.phase = SessionPhase::Querying;
        let outcome = self
            .results
            .get_or_compute(
                &self.state,
                &self.visible,
                &self.registry,
                self.executor.as_ref(),
            )
            .await;
        match outcome {
            Ok(result) => {
                self.phase = SessionPhase::Idle;
                self.last_result = Some(Arc::clone(&result));
                Ok(result)
            }
            Err(err) => {
                self.phase = SessionPhase::Dirty;
                Err(err)
            }
        }
    }

    /// Options for the filter control of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DataSource`] if the executor fails.
    pub async fn get_distinct_values(&self, key: &str) -> Result<Vec<Value>, SessionError> {
        self.distinct
            .get_distinct_values(key, &self.registry, self.executor.as_ref())
            .await
    }

    pub fn clear_distinct_values_cache(&self) {
        self.distinct.clear();
    }

    /// Drops every cached page of this session's scope, e.g. after an
    /// out-of-band write to the underlying data.
    pub fn invalidate(&mut self) {
        self.results.invalidate();
        self.phase = SessionPhase::Dirty;
    }

    fn apply(&mut self, changed: bool) -> bool {
        if changed {
            self.phase = SessionPhase::Dirty;
            let plan = plan_relations(&self.visible, self.state.filter_column(), &self.registry);
            if plan != self.plan {
                tracing::debug!(scope = %self.scope, ?plan, "eager-load plan changed");
                self.plan = plan;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use gridfetch_core::{
        ColumnConfig, ColumnRegistry, RelationConfig, RelationKind, Row, StaticIdentity,
        TableConfig,
    };

    use super::*;
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
                ColumnConfig::new("id").sortable(),
                ColumnConfig::new("status").filterable().typed("select"),
                ColumnConfig::new("customer:name").searchable().filterable(),
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

    fn session(executor: Arc<InMemoryExecutor>) -> TableSession {
        TableSession::new(
            &StaticIdentity::new(Scope::new("alice", "orders")),
            registry(),
            executor,
            &CacheFactory::default(),
            SessionConfig::default(),
        )
    }

    fn executor() -> Arc<InMemoryExecutor> {
        Arc::new(
            InMemoryExecutor::new()
                .with_table(
                    "orders",
                    vec![row(&[
                        ("id", Value::Int(1)),
                        ("status", Value::from("active")),
                        ("customer_id", Value::Int(7)),
                    ])],
                )
                .with_table(
                    "customers",
                    vec![row(&[("id", Value::Int(7)), ("name", Value::from("Ann"))])],
                ),
        )
    }

    #[tokio::test]
    async fn phases_follow_mutations_and_fetches() {
        let mut session = session(executor());
        assert_eq!(session.phase(), SessionPhase::Idle);

        assert!(session.set_search("ann"));
        assert_eq!(session.phase(), SessionPhase::Dirty);

        session.get_page().await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Idle);

        assert!(!session.set_search("ann"));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_session_dirty() {
        let exec = executor();
        let mut session = session(Arc::clone(&exec));
        exec.fail_next("down");
        assert!(session.get_page().await.is_err());
        assert_eq!(session.phase(), SessionPhase::Dirty);
        assert!(session.page_meta().is_none());
    }

    #[test]
    fn plan_tracks_visibility_and_filter_target() {
        let mut session = session(executor());
        assert_eq!(session.plan_relations(), &BTreeSet::from(["customer".to_string()]));

        session.set_visible_columns(["id", "status"]);
        assert!(session.plan_relations().is_empty());

        session.set_filter_column(Some("customer:name".to_string()));
        assert_eq!(session.plan_relations(), &BTreeSet::from(["customer".to_string()]));

        session.clear_filter();
        assert!(session.plan_relations().is_empty());
    }

    #[test]
    fn page_size_is_clamped_to_config() {
        let mut session = session(executor());
        session.set_page_size(10_000);
        assert_eq!(session.state().page_size(), SessionConfig::default().max_page_size);
    }

    #[tokio::test]
    async fn page_meta_reflects_last_page() {
        let mut session = session(executor());
        let page = session.get_page().await.unwrap();
        assert_eq!(page.rows[0].related["customer"].len(), 1);
        let meta = session.page_meta().unwrap();
        assert_eq!(meta.total_count, 1);
        assert_eq!(meta.last_page, 1);
    }
}
