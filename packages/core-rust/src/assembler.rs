//! Query assembly: interaction state + registry → [`QuerySpec`].
//!
//! Pure and I/O-free. Keys are resolved only through the registry; anything
//! that does not resolve is dropped fail-soft and recorded as an
//! [`UnknownKeyWarning`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{KeyOrigin, UnknownKeyWarning};
use crate::planner::relation_links;
use crate::query::{
    Aggregate, Comparison, Condition, DistinctQuery, OrderBy, Pagination, Predicate, QuerySpec,
    SortKey,
};
use crate::registry::{ColumnDescriptor, ColumnRegistry, ColumnSource, ValueType};
use crate::state::{FilterOperator, FilterValue, InteractionState, SortDirection};
use crate::types::Value;

static CALENDAR_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

/// Builds the query for the current state.
///
/// `visible` holds the keys of the columns currently shown (search only
/// covers visible columns); `plan` is the eager-load plan from
/// [`plan_relations`](crate::plan_relations).
#[must_use]
pub fn build(
    state: &InteractionState,
    visible: &BTreeSet<String>,
    plan: &BTreeSet<String>,
    registry: &ColumnRegistry,
) -> QuerySpec {
    let mut warnings = Vec::new();
    let mut conditions = Vec::new();

    if let Some(search) = search_condition(state, visible, registry) {
        conditions.push(search);
    }
    if let Some(filter) = filter_condition(state, registry, &mut warnings) {
        conditions.push(filter);
    }
    if let Some(range) = date_range_condition(state, registry, &mut warnings) {
        conditions.push(range);
    }

    let order = ordering(state, registry, &mut warnings);

    for warning in &warnings {
        tracing::warn!(model = registry.model(), %warning, "dropped unresolvable key");
    }

    QuerySpec {
        model: registry.model().to_string(),
        table: registry.table().to_string(),
        primary_key: registry.primary_key().to_string(),
        conditions,
        order,
        pagination: Pagination {
            offset: state.offset(),
            limit: state.page_size(),
        },
        eager_loads: relation_links(plan, registry),
        warnings,
    }
}

/// Builds the distinct-value query for a filterable column.
///
/// Relation-backed columns query the related table's attribute, not the base
/// table. Returns `None` for unknown or non-filterable keys.
#[must_use]
pub fn build_distinct(key: &str, registry: &ColumnRegistry, limit: usize) -> Option<DistinctQuery> {
    let column = registry.column(key).filter(|c| c.flags.filterable)?;
    let (table, field) = match &column.source {
        ColumnSource::Direct { field } => (registry.table().to_string(), field.clone()),
        ColumnSource::Relation {
            relation,
            attribute,
        } => (registry.relation(relation)?.table.clone(), attribute.clone()),
    };
    Some(DistinctQuery {
        table,
        field,
        limit,
    })
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Wraps a comparison on `source` into a base-row condition. Relation sources
/// become existence tests.
fn condition_on(
    source: &ColumnSource,
    comparison: Comparison,
    registry: &ColumnRegistry,
) -> Option<Condition> {
    match source {
        ColumnSource::Direct { field } => {
            Some(Condition::Field(Predicate::new(field.clone(), comparison)))
        }
        ColumnSource::Relation {
            relation,
            attribute,
        } => Some(Condition::Exists {
            relation: registry.relation(relation)?.clone(),
            predicate: Predicate::new(attribute.clone(), comparison),
        }),
    }
}

fn search_condition(
    state: &InteractionState,
    visible: &BTreeSet<String>,
    registry: &ColumnRegistry,
) -> Option<Condition> {
    let term = state.search_term().trim();
    if term.is_empty() {
        return None;
    }
    let any: Vec<Condition> = registry
        .columns()
        .iter()
        .filter(|c| c.flags.searchable && visible.contains(&c.key))
        .filter_map(|c| condition_on(&c.source, Comparison::Contains(term.to_string()), registry))
        .collect();
    if any.is_empty() {
        tracing::debug!(model = registry.model(), "search ignored: no visible searchable columns");
        return None;
    }
    Some(Condition::AnyOf(any))
}

fn filter_condition(
    state: &InteractionState,
    registry: &ColumnRegistry,
    warnings: &mut Vec<UnknownKeyWarning>,
) -> Option<Condition> {
    let key = state.filter_column()?;
    let value = state.filter_value().filter(|v| !v.is_empty())?;

    let mut reject = |reason: &'static str| {
        warnings.push(UnknownKeyWarning {
            origin: KeyOrigin::Filter,
            key: key.to_string(),
            reason,
        });
        None
    };

    let Some(column) = registry.column(key) else {
        return reject("not registered");
    };
    if !column.flags.filterable {
        return reject("column is not filterable");
    }
    let value_type = column.effective_type();
    let operator = state
        .filter_operator()
        .unwrap_or_else(|| value_type.default_operator());
    if !value_type.allows(operator) {
        return reject("operator not allowed for column type");
    }
    match comparison_for(value_type, operator, value) {
        Ok(comparison) => condition_on(&column.source, comparison, registry),
        Err(reason) => reject(reason),
    }
}

fn comparison_for(
    value_type: ValueType,
    operator: FilterOperator,
    value: &FilterValue,
) -> Result<Comparison, &'static str> {
    match (operator, value) {
        (FilterOperator::Contains, FilterValue::Single(s)) => {
            Ok(Comparison::Contains(s.trim().to_string()))
        }
        (FilterOperator::OneOf, FilterValue::Single(s)) => {
            Ok(Comparison::OneOf(vec![Value::from(s.trim())]))
        }
        (FilterOperator::OneOf, FilterValue::OneOf(items)) => Ok(Comparison::OneOf(
            items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(Value::from)
                .collect(),
        )),
        (FilterOperator::On, FilterValue::Single(s)) => {
            let day = calendar_day(s).ok_or("malformed date")?;
            Ok(Comparison::OnDate(day))
        }
        (FilterOperator::Between, FilterValue::Between { from, to }) => {
            Ok(Comparison::DateBetween {
                from: optional_day(from.as_deref())?,
                to: optional_day(to.as_deref())?,
            })
        }
        (op, FilterValue::Single(s)) if value_type == ValueType::Number => {
            let number = Value::parse_number(s).ok_or("value is not a number")?;
            Ok(match op {
                FilterOperator::Neq => Comparison::NotEquals(number),
                FilterOperator::Gt => Comparison::GreaterThan(number),
                FilterOperator::Gte => Comparison::GreaterOrEqual(number),
                FilterOperator::Lt => Comparison::LessThan(number),
                FilterOperator::Lte => Comparison::LessOrEqual(number),
                _ => Comparison::Equals(number),
            })
        }
        _ => Err("value shape does not match operator"),
    }
}

fn calendar_day(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    CALENDAR_DAY
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}

/// Blank bounds are open; non-blank bounds must be well-formed days.
fn optional_day(raw: Option<&str>) -> Result<Option<String>, &'static str> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => calendar_day(s).map(Some).ok_or("malformed date"),
        None => Ok(None),
    }
}

fn date_range_condition(
    state: &InteractionState,
    registry: &ColumnRegistry,
    warnings: &mut Vec<UnknownKeyWarning>,
) -> Option<Condition> {
    let (start, end) = state.date_range();
    let start = start.map(str::trim).filter(|s| !s.is_empty())?;
    let end = end.map(str::trim).filter(|s| !s.is_empty())?;

    let mut reject = |key: String, reason: &'static str| {
        warnings.push(UnknownKeyWarning {
            origin: KeyOrigin::DateRange,
            key,
            reason,
        });
        None
    };

    let Some(column) = registry.date_column() else {
        return reject(String::new(), "no date column configured");
    };
    let (Some(from), Some(to)) = (calendar_day(start), calendar_day(end)) else {
        return reject(column.key.clone(), "malformed date");
    };
    condition_on(
        &column.source,
        Comparison::DateBetween {
            from: Some(from),
            to: Some(to),
        },
        registry,
    )
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn order_by(column: &ColumnDescriptor, direction: SortDirection, registry: &ColumnRegistry) -> Option<OrderBy> {
    let key = match &column.source {
        ColumnSource::Direct { field } => SortKey::Field(field.clone()),
        ColumnSource::Relation {
            relation,
            attribute,
        } => SortKey::Related {
            relation: registry.relation(relation)?.clone(),
            attribute: attribute.clone(),
            aggregate: match direction {
                SortDirection::Asc => Aggregate::Min,
                SortDirection::Desc => Aggregate::Max,
            },
        },
    };
    Some(OrderBy { key, direction })
}

fn ordering(
    state: &InteractionState,
    registry: &ColumnRegistry,
    warnings: &mut Vec<UnknownKeyWarning>,
) -> Vec<OrderBy> {
    let requested = state.sort_column().and_then(|key| {
        let reason = match registry.column(key) {
            Some(column) if column.flags.sortable => {
                return order_by(column, state.sort_direction(), registry);
            }
            Some(_) => "column is not sortable",
            None => "not registered",
        };
        warnings.push(UnknownKeyWarning {
            origin: KeyOrigin::Sort,
            key: key.to_string(),
            reason,
        });
        None
    });

    let primary = requested.or_else(|| {
        registry
            .default_sort()
            .and_then(|(column, direction)| order_by(column, direction, registry))
    });

    let pk = registry.primary_key();
    let mut order: Vec<OrderBy> = primary.into_iter().collect();
    let sorted_by_pk = order
        .first()
        .is_some_and(|o| o.key == SortKey::Field(pk.to_string()));
    if !sorted_by_pk {
        order.push(OrderBy {
            key: SortKey::Field(pk.to_string()),
            direction: SortDirection::Asc,
        });
    }
    order
}
