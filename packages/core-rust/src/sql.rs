//! Parameterized SQL rendering of assembled queries.
//!
//! Identifiers come only from the registry (already restricted to
//! `[A-Za-z_][A-Za-z0-9_]*`) and are double-quoted; every user-supplied value
//! becomes a `?` parameter. Relation conditions render as `EXISTS` subqueries
//! and relation ordering as correlated scalar subqueries, so no statement
//! produced here contains a `JOIN`.

use crate::query::{
    Aggregate, Comparison, Condition, CountQuery, DistinctQuery, OrderBy, Predicate, QuerySpec,
    SortKey,
};
use crate::registry::RelationLink;
use crate::state::SortDirection;
use crate::types::Value;

/// SQL text with positional `?` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<Value>,
}

/// Renders the page query: filtered, ordered, limited.
#[must_use]
pub fn render_select(spec: &QuerySpec) -> SqlStatement {
    let mut out = Renderer::default();
    let table = quote(&spec.table);
    out.push(&format!("SELECT {table}.* FROM {table}"));
    out.where_clause(&spec.table, &spec.conditions);
    out.order_clause(&spec.table, &spec.order);
    out.push(" LIMIT ? OFFSET ?");
    out.params.push(Value::Int(i64::from(spec.pagination.limit)));
    out.params
        .push(Value::Int(i64::try_from(spec.pagination.offset).unwrap_or(i64::MAX)));
    out.finish()
}

/// Renders the total-count query. Same conditions, no ordering, no limit.
#[must_use]
pub fn render_count(count: CountQuery<'_>) -> SqlStatement {
    let mut out = Renderer::default();
    out.push(&format!("SELECT COUNT(*) FROM {}", quote(count.table)));
    out.where_clause(count.table, count.conditions);
    out.finish()
}

/// Renders a bounded distinct-value lookup, nulls excluded.
#[must_use]
pub fn render_distinct(query: &DistinctQuery) -> SqlStatement {
    let field = quote(&query.field);
    SqlStatement {
        text: format!(
            "SELECT DISTINCT {field} FROM {} WHERE {field} IS NOT NULL ORDER BY {field} LIMIT ?",
            quote(&query.table)
        ),
        params: vec![Value::Int(i64::try_from(query.limit).unwrap_or(i64::MAX))],
    }
}

/// Renders the single batch that loads `relation` for a page of base rows.
///
/// `keys` are the page rows' values of `relation.base_key`.
#[must_use]
pub fn render_eager_load(relation: &RelationLink, keys: &[Value]) -> SqlStatement {
    let table = quote(&relation.table);
    let text = if keys.is_empty() {
        format!("SELECT {table}.* FROM {table} WHERE 1 = 0")
    } else {
        format!(
            "SELECT {table}.* FROM {table} WHERE {table}.{} IN ({})",
            quote(&relation.related_key),
            placeholders(keys.len())
        )
    };
    SqlStatement {
        text,
        params: keys.to_vec(),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column(table: &str, field: &str) -> String {
    format!("{}.{}", quote(table), quote(field))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn relation_alias(relation: &RelationLink) -> String {
    format!("{}_rel", relation.name)
}

/// Escapes LIKE wildcards so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Default)]
struct Renderer {
    text: String,
    params: Vec<Value>,
}

impl Renderer {
    fn push(&mut self, sql: &str) {
        self.text.push_str(sql);
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            text: self.text,
            params: self.params,
        }
    }

    fn where_clause(&mut self, table: &str, conditions: &[Condition]) {
        if conditions.is_empty() {
            return;
        }
        self.push(" WHERE ");
        for (i, condition) in conditions.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.condition(table, condition);
        }
    }

    fn condition(&mut self, table: &str, condition: &Condition) {
        match condition {
            Condition::Field(predicate) => self.predicate(table, predicate),
            Condition::Exists {
                relation,
                predicate,
            } => {
                let alias = relation_alias(relation);
                self.push(&format!(
                    "EXISTS (SELECT 1 FROM {} AS {} WHERE {} = {} AND ",
                    quote(&relation.table),
                    quote(&alias),
                    column(&alias, &relation.related_key),
                    column(table, &relation.base_key),
                ));
                self.predicate(&alias, predicate);
                self.push(")");
            }
            Condition::AnyOf(any) if any.is_empty() => self.push("1 = 0"),
            Condition::AnyOf(any) => {
                self.push("(");
                for (i, c) in any.iter().enumerate() {
                    if i > 0 {
                        self.push(" OR ");
                    }
                    self.condition(table, c);
                }
                self.push(")");
            }
        }
    }

    fn predicate(&mut self, table: &str, predicate: &Predicate) {
        let col = column(table, &predicate.field);
        let binary = |op: &str| format!("{col} {op} ?");
        match &predicate.comparison {
            Comparison::Equals(v) => self.bind(&binary("="), v.clone()),
            Comparison::NotEquals(v) => self.bind(&binary("<>"), v.clone()),
            Comparison::GreaterThan(v) => self.bind(&binary(">"), v.clone()),
            Comparison::GreaterOrEqual(v) => self.bind(&binary(">="), v.clone()),
            Comparison::LessThan(v) => self.bind(&binary("<"), v.clone()),
            Comparison::LessOrEqual(v) => self.bind(&binary("<="), v.clone()),
            Comparison::Contains(term) => self.bind(
                &format!("LOWER(CAST({col} AS TEXT)) LIKE ? ESCAPE '\\'"),
                Value::String(like_pattern(term)),
            ),
            Comparison::OneOf(values) if values.is_empty() => self.push("1 = 0"),
            Comparison::OneOf(values) => {
                self.push(&format!("{col} IN ({})", placeholders(values.len())));
                self.params.extend(values.iter().cloned());
            }
            Comparison::OnDate(day) => {
                self.bind(&format!("DATE({col}) = ?"), Value::String(day.clone()));
            }
            Comparison::DateBetween { from, to } => match (from, to) {
                (Some(from), Some(to)) => {
                    self.push(&format!("DATE({col}) BETWEEN ? AND ?"));
                    self.params.push(Value::String(from.clone()));
                    self.params.push(Value::String(to.clone()));
                }
                (Some(from), None) => {
                    self.bind(&format!("DATE({col}) >= ?"), Value::String(from.clone()));
                }
                (None, Some(to)) => {
                    self.bind(&format!("DATE({col}) <= ?"), Value::String(to.clone()));
                }
                (None, None) => self.push("1 = 1"),
            },
        }
    }

    fn bind(&mut self, sql: &str, value: Value) {
        self.push(sql);
        self.params.push(value);
    }

    fn order_clause(&mut self, table: &str, order: &[OrderBy]) {
        if order.is_empty() {
            return;
        }
        let terms: Vec<String> = order
            .iter()
            .map(|o| {
                let key = match &o.key {
                    SortKey::Field(field) => column(table, field),
                    SortKey::Related {
                        relation,
                        attribute,
                        aggregate,
                    } => {
                        let alias = relation_alias(relation);
                        let func = match aggregate {
                            Aggregate::Min => "MIN",
                            Aggregate::Max => "MAX",
                        };
                        format!(
                            "(SELECT {func}({}) FROM {} AS {} WHERE {} = {})",
                            column(&alias, attribute),
                            quote(&relation.table),
                            quote(&alias),
                            column(&alias, &relation.related_key),
                            column(table, &relation.base_key),
                        )
                    }
                };
                let dir = match o.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{key} {dir}")
            })
            .collect();
        self.push(" ORDER BY ");
        self.push(&terms.join(", "));
    }
}
