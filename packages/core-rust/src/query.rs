//! Executable query description produced by the assembler.
//!
//! A [`QuerySpec`] is a small, closed expression tree. Every field and table
//! name in it was resolved through the [`ColumnRegistry`](crate::ColumnRegistry).
//! Relation conditions are existence tests and relation ordering is a
//! correlated aggregate, so executing a spec never needs a join and never
//! duplicates base rows.

use std::collections::BTreeSet;

use crate::error::UnknownKeyWarning;
use crate::registry::RelationLink;
use crate::state::SortDirection;
use crate::types::Value;

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Test applied to a single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equals(Value),
    NotEquals(Value),
    GreaterThan(Value),
    GreaterOrEqual(Value),
    LessThan(Value),
    LessOrEqual(Value),
    /// Case-insensitive substring match on the value's text form.
    Contains(String),
    /// Equals any of the listed values.
    OneOf(Vec<Value>),
    /// The value's calendar day (`YYYY-MM-DD`) equals the given day.
    OnDate(String),
    /// The value's calendar day lies in the inclusive range. Open bounds are `None`.
    DateBetween {
        from: Option<String>,
        to: Option<String>,
    },
}

/// A comparison bound to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
}

impl Predicate {
    #[must_use]
    pub fn new(field: impl Into<String>, comparison: Comparison) -> Self {
        Self {
            field: field.into(),
            comparison,
        }
    }
}

/// A boolean condition over a base row.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Predicate on a base-table field.
    Field(Predicate),
    /// At least one related row satisfies the predicate.
    Exists {
        relation: RelationLink,
        predicate: Predicate,
    },
    /// Disjunction. An empty list matches nothing.
    AnyOf(Vec<Condition>),
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Aggregate used to reduce many related values to one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
}

/// What to order by.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// A base-table field.
    Field(String),
    /// A correlated subquery over one relation: the `aggregate` of `attribute`
    /// across the row's related records. Rows with no related records sort as null.
    Related {
        relation: RelationLink,
        attribute: String,
        aggregate: Aggregate,
    },
}

/// A single ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub key: SortKey,
    pub direction: SortDirection,
}

// ---------------------------------------------------------------------------
// QuerySpec
// ---------------------------------------------------------------------------

/// Rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u32,
}

/// A fully assembled, executable query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub model: String,
    pub table: String,
    pub primary_key: String,
    /// Conjunction of conditions. Empty means every row.
    pub conditions: Vec<Condition>,
    /// Ordering terms, most significant first. Always ends with the primary key.
    pub order: Vec<OrderBy>,
    pub pagination: Pagination,
    /// Relations to load for the returned rows, one batch per relation.
    pub eager_loads: Vec<RelationLink>,
    /// Keys dropped during assembly. Not part of the query itself.
    pub warnings: Vec<UnknownKeyWarning>,
}

impl QuerySpec {
    /// The matching count query: identical conditions, no ordering, no limit.
    #[must_use]
    pub fn count_query(&self) -> CountQuery<'_> {
        CountQuery {
            table: &self.table,
            conditions: &self.conditions,
        }
    }

    /// Names of the relations this spec eager-loads.
    #[must_use]
    pub fn eager_load_names(&self) -> BTreeSet<String> {
        self.eager_loads.iter().map(|r| r.name.clone()).collect()
    }
}

/// Total-count query sharing its conditions with a [`QuerySpec`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountQuery<'a> {
    pub table: &'a str,
    pub conditions: &'a [Condition],
}

/// Query for the distinct non-null values of one field, used to populate
/// filter controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinctQuery {
    /// Table holding the field: the related table for relation columns.
    pub table: String,
    pub field: String,
    pub limit: usize,
}
