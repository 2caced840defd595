//! Declarative table configuration as supplied by the host at mount time.
//!
//! These are raw, unvalidated shapes. [`ColumnRegistry::register`](crate::ColumnRegistry::register)
//! turns a [`TableConfig`] into the validated lookup table that every other
//! component resolves keys through.

use serde::{Deserialize, Serialize};

use crate::state::SortDirection;

/// Configuration for one table/grid: the base model, its relations, and its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Model identity, folded into every fingerprint.
    pub model: String,
    /// Base table name.
    pub table: String,
    /// Primary key field of the base table. Used as the final sort tiebreak.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Column key of the date column used by the date-range filter.
    #[serde(default)]
    pub date_column: Option<String>,
    /// Ordering applied when no (valid) sort column is selected.
    #[serde(default)]
    pub default_sort: Option<SortConfig>,
    /// Relations that relation-backed columns may reference.
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Column declarations, in display order.
    pub columns: Vec<ColumnConfig>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TableConfig {
    /// Parses a table configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or does not match the shape.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A single column declaration.
///
/// `key` is either a direct field name (`"status"`) or a one-hop relation path
/// (`"customer:name"`). `value_type` is kept as raw text here so that an
/// unrecognized type can be reported as a configuration error rather than a
/// deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
}

impl ColumnConfig {
    /// Creates a column with all flags off and no value type.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            sortable: false,
            searchable: false,
            filterable: false,
            value_type: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    #[must_use]
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    #[must_use]
    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    #[must_use]
    pub fn typed(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }
}

/// Cardinality of a relation from the base table's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Base row holds a foreign key to exactly one related row.
    BelongsTo,
    /// Many related rows hold a foreign key back to the base row.
    HasMany,
}

/// Declaration of a relation that columns may traverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    pub name: String,
    /// Related table name.
    pub table: String,
    pub kind: RelationKind,
    /// For `belongsTo`: field on the base table. For `hasMany`: field on the
    /// related table.
    pub foreign_key: String,
    /// The field the foreign key points at. Defaults to `id` (on the related
    /// table for `belongsTo`, on the base table for `hasMany`).
    #[serde(default)]
    pub owner_key: Option<String>,
}

/// Default ordering for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortConfig {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}
