//! In-memory [`QueryExecutor`] backed by [`DashMap`].
//!
//! Evaluates a [`QuerySpec`] the way the SQL produced by
//! [`gridfetch_core::sql`] would run: null never satisfies a comparison,
//! relation conditions are existence tests, relation sort keys are correlated
//! aggregates, and each eager load is a single batch over the page. Call
//! counters make cache behavior observable in tests.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use gridfetch_core::{
    sql, Aggregate, Comparison, Condition, CountQuery, DistinctQuery, OrderBy, Predicate, QuerySpec,
    RelationLink, Row, SortDirection, SortKey, Value,
};
use parking_lot::Mutex;

use super::{QueryExecutor, QueryOutput, ResultRow};

type Tables = HashMap<String, Vec<Row>>;

/// Point-in-time call counters of an [`InMemoryExecutor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Calls to [`QueryExecutor::run`], including failed ones.
    pub run_calls: u64,
    /// Calls to [`QueryExecutor::distinct_values`], including failed ones.
    pub distinct_calls: u64,
    /// Total-count queries issued across all runs.
    pub count_queries: u64,
    /// Eager-load batches issued across all runs.
    pub relation_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    run_calls: AtomicU64,
    distinct_calls: AtomicU64,
    count_queries: AtomicU64,
    relation_batches: AtomicU64,
}

/// Named tables of rows held in memory.
///
/// Suitable for tests, demos, and small read-only datasets.
#[derive(Debug, Default)]
pub struct InMemoryExecutor {
    tables: DashMap<String, Vec<Row>>,
    counters: Counters,
    latency: Option<Duration>,
    failures: Mutex<VecDeque<String>>,
}

impl InMemoryExecutor {
    /// Creates an executor with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a dataset shaped as `{"table": [{...row...}, ...], ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a map of table names to row arrays.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let tables: HashMap<String, Vec<Row>> = serde_json::from_str(json)?;
        let executor = Self::new();
        for (name, rows) in tables {
            executor.insert_table(name, rows);
        }
        Ok(executor)
    }

    #[must_use]
    pub fn with_table(self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(name, rows);
        self
    }

    /// Delays every call by `latency` before doing any work.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replaces the contents of `name`.
    pub fn insert_table(&self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(name.into(), rows);
    }

    /// Deletes rows of `table` whose `field` equals `value`. Returns the
    /// number of rows removed.
    pub fn remove_where(&self, table: &str, field: &str, value: &Value) -> usize {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| {
            row.get(field)
                .is_none_or(|v| v.compare(value) != Some(Ordering::Equal))
        });
        before - rows.len()
    }

    /// Makes the next call (of either kind) fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.lock().push_back(message.into());
    }

    fn count(&self, query: CountQuery<'_>, tables: &Tables) -> anyhow::Result<u64> {
        self.counters.count_queries.fetch_add(1, AtomicOrdering::Relaxed);
        let statement = sql::render_count(query);
        tracing::debug!(sql = %statement.text, params = statement.params.len(), "counting matches");

        let base = tables
            .get(query.table)
            .ok_or_else(|| anyhow!("unknown table {:?}", query.table))?;
        let total = base
            .iter()
            .filter(|row| query.conditions.iter().all(|c| matches(c, row, tables)))
            .count();
        Ok(u64::try_from(total).unwrap_or(u64::MAX))
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            run_calls: self.counters.run_calls.load(AtomicOrdering::Relaxed),
            distinct_calls: self.counters.distinct_calls.load(AtomicOrdering::Relaxed),
            count_queries: self.counters.count_queries.load(AtomicOrdering::Relaxed),
            relation_batches: self.counters.relation_batches.load(AtomicOrdering::Relaxed),
        }
    }

    async fn before_call(&self) -> anyhow::Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.failures.lock().pop_front();
        if let Some(message) = failure {
            bail!(message);
        }
        Ok(())
    }

    fn snapshot(&self) -> Tables {
        self.tables
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Attaches `relation` to every row of the page in one pass over the
    /// related table.
    fn load_relation(&self, relation: &RelationLink, rows: &mut [ResultRow], tables: &Tables) {
        let keys: Vec<Value> = rows
            .iter()
            .map(|row| row.field(&relation.base_key))
            .filter(|key| !key.is_null())
            .cloned()
            .collect();

        let statement = sql::render_eager_load(relation, &keys);
        self.counters
            .relation_batches
            .fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(
            relation = %relation.name,
            keys = keys.len(),
            sql = %statement.text,
            "eager-loading relation"
        );

        let batch: Vec<&Row> = tables
            .get(&relation.table)
            .into_iter()
            .flatten()
            .filter(|related| {
                related
                    .get(&relation.related_key)
                    .is_some_and(|rk| keys.iter().any(|k| rk.compare(k) == Some(Ordering::Equal)))
            })
            .collect();

        for row in rows.iter_mut() {
            let key = row.field(&relation.base_key).clone();
            let related: Vec<Row> = batch
                .iter()
                .filter(|r| {
                    r.get(&relation.related_key)
                        .is_some_and(|rk| rk.compare(&key) == Some(Ordering::Equal))
                })
                .map(|r| (*r).clone())
                .collect();
            row.related.insert(relation.name.clone(), related);
        }
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn run(&self, spec: &QuerySpec) -> anyhow::Result<QueryOutput> {
        self.counters.run_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.before_call().await?;

        let select = sql::render_select(spec);
        tracing::debug!(
            model = %spec.model,
            sql = %select.text,
            params = select.params.len(),
            "executing page query"
        );

        let tables = self.snapshot();
        let base = tables
            .get(&spec.table)
            .ok_or_else(|| anyhow!("unknown table {:?}", spec.table))?;

        let matched: Vec<&Row> = base
            .iter()
            .filter(|row| spec.conditions.iter().all(|c| matches(c, row, &tables)))
            .collect();
        let total_count = self.count(spec.count_query(), &tables)?;

        let offset = usize::try_from(spec.pagination.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(spec.pagination.limit).unwrap_or(usize::MAX);
        let mut rows: Vec<ResultRow> = sort_rows(matched, &spec.order, &tables)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| ResultRow::new(row.clone()))
            .collect();

        for relation in &spec.eager_loads {
            self.load_relation(relation, &mut rows, &tables);
        }

        Ok(QueryOutput {
            rows,
            total_count,
            relations_loaded: spec.eager_load_names(),
        })
    }

    async fn distinct_values(&self, query: &DistinctQuery) -> anyhow::Result<Vec<Value>> {
        self.counters
            .distinct_calls
            .fetch_add(1, AtomicOrdering::Relaxed);
        self.before_call().await?;

        let statement = sql::render_distinct(query);
        tracing::debug!(sql = %statement.text, "loading distinct values");

        let mut values: Vec<Value> = {
            let rows = self
                .tables
                .get(&query.table)
                .ok_or_else(|| anyhow!("unknown table {:?}", query.table))?;
            rows.iter()
                .filter_map(|row| row.get(&query.field))
                .filter(|v| !v.is_null())
                .cloned()
                .collect()
        };
        values.sort_by(Value::sort_cmp);
        values.dedup_by(|a, b| a.sort_cmp(b) == Ordering::Equal);
        values.truncate(query.limit);
        Ok(values)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Rows of `relation` linked to `row`. A null link key links nothing.
fn related_rows<'a>(
    relation: &'a RelationLink,
    row: &'a Row,
    tables: &'a Tables,
) -> impl Iterator<Item = &'a Row> + 'a {
    let key = row.get(&relation.base_key).filter(|v| !v.is_null());
    tables
        .get(&relation.table)
        .into_iter()
        .flatten()
        .filter(move |related| {
            key.is_some_and(|k| {
                related
                    .get(&relation.related_key)
                    .is_some_and(|rk| rk.compare(k) == Some(Ordering::Equal))
            })
        })
}

fn matches(condition: &Condition, row: &Row, tables: &Tables) -> bool {
    match condition {
        Condition::Field(predicate) => satisfies(predicate, row),
        Condition::Exists {
            relation,
            predicate,
        } => related_rows(relation, row, tables).any(|related| satisfies(predicate, related)),
        Condition::AnyOf(any) => any.iter().any(|c| matches(c, row, tables)),
    }
}

fn satisfies(predicate: &Predicate, row: &Row) -> bool {
    let value = match row.get(&predicate.field) {
        Some(v) if !v.is_null() => v,
        _ => return false,
    };
    let ord = |other: &Value| value.compare(other);
    match &predicate.comparison {
        Comparison::Equals(v) => ord(v) == Some(Ordering::Equal),
        Comparison::NotEquals(v) => matches!(ord(v), Some(Ordering::Less | Ordering::Greater)),
        Comparison::GreaterThan(v) => ord(v) == Some(Ordering::Greater),
        Comparison::GreaterOrEqual(v) => {
            matches!(ord(v), Some(Ordering::Greater | Ordering::Equal))
        }
        Comparison::LessThan(v) => ord(v) == Some(Ordering::Less),
        Comparison::LessOrEqual(v) => matches!(ord(v), Some(Ordering::Less | Ordering::Equal)),
        Comparison::Contains(term) => value
            .to_string()
            .to_lowercase()
            .contains(&term.to_lowercase()),
        Comparison::OneOf(options) => {
            let text = value.to_string();
            options.iter().any(|option| option.to_string() == text)
        }
        Comparison::OnDate(day) => value.date_part() == Some(day.as_str()),
        Comparison::DateBetween { from, to } => value.date_part().is_some_and(|d| {
            from.as_deref().is_none_or(|f| d >= f) && to.as_deref().is_none_or(|t| d <= t)
        }),
    }
}

fn sort_value(key: &SortKey, row: &Row, tables: &Tables) -> Value {
    match key {
        SortKey::Field(field) => row.get(field).cloned().unwrap_or(Value::Null),
        SortKey::Related {
            relation,
            attribute,
            aggregate,
        } => {
            let values = related_rows(relation, row, tables)
                .filter_map(|related| related.get(attribute))
                .filter(|v| !v.is_null());
            let picked = match aggregate {
                Aggregate::Min => values.min_by(|a, b| a.sort_cmp(b)),
                Aggregate::Max => values.max_by(|a, b| a.sort_cmp(b)),
            };
            picked.cloned().unwrap_or(Value::Null)
        }
    }
}

/// Stable sort on precomputed keys. Nulls sort first ascending, last descending.
fn sort_rows<'a>(rows: Vec<&'a Row>, order: &[OrderBy], tables: &Tables) -> Vec<&'a Row> {
    let mut keyed: Vec<(Vec<Value>, &'a Row)> = rows
        .into_iter()
        .map(|row| {
            let keys = order.iter().map(|o| sort_value(&o.key, row, tables)).collect();
            (keys, row)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), term) in a.iter().zip(b).zip(order) {
            let ord = match term.direction {
                SortDirection::Asc => x.sort_cmp(y),
                SortDirection::Desc => y.sort_cmp(x),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    keyed.into_iter().map(|(_, row)| row).collect()
}
