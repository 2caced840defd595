//! The data-source seam.
//!
//! Sessions never talk to storage directly: they hand an assembled
//! [`QuerySpec`] to a [`QueryExecutor`] and cache whatever comes back.

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use gridfetch_core::{DistinctQuery, QuerySpec, Row, Value};
use serde::Serialize;

pub use memory::{ExecutorStats, InMemoryExecutor};

/// One base row with its eager-loaded related rows, keyed by relation name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub record: Row,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub related: BTreeMap<String, Vec<Row>>,
}

impl ResultRow {
    #[must_use]
    pub fn new(record: Row) -> Self {
        Self {
            record,
            related: BTreeMap::new(),
        }
    }

    /// Value of a base-table field, `Null` when absent.
    #[must_use]
    pub fn field(&self, name: &str) -> &Value {
        self.record.get(name).unwrap_or(&Value::Null)
    }
}

/// What an executor returns for one [`QuerySpec`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// The requested page.
    pub rows: Vec<ResultRow>,
    /// Rows matching the conditions across all pages.
    pub total_count: u64,
    /// Names of the relations attached to `rows`.
    pub relations_loaded: BTreeSet<String>,
}

/// Runs assembled queries against a data source.
///
/// Implementations must load each of `spec.eager_loads` in a single batch for
/// the whole page, and must not duplicate base rows when conditions or
/// ordering reference relations.
///
/// Used as `Arc<dyn QueryExecutor>`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes the page query and its count query.
    async fn run(&self, spec: &QuerySpec) -> anyhow::Result<QueryOutput>;

    /// Returns the distinct non-null values of one field, at most `query.limit`.
    async fn distinct_values(&self, query: &DistinctQuery) -> anyhow::Result<Vec<Value>>;
}
