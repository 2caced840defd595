//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gridfetch_core::{
    ClockSource, ColumnConfig, ColumnRegistry, RegistryHandle, RelationConfig, RelationKind, Row,
    Scope, StaticIdentity, TableConfig, Value,
};
use gridfetch_session::{CacheFactory, InMemoryExecutor, SessionConfig, TableSession};

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(millis: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(millis)))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Orders with a belongs-to customer and has-many items.
pub fn order_registry() -> RegistryHandle {
    ColumnRegistry::register(&TableConfig {
        model: "Order".to_string(),
        table: "orders".to_string(),
        primary_key: "id".to_string(),
        date_column: Some("created_at".to_string()),
        default_sort: None,
        relations: vec![
            RelationConfig {
                name: "customer".to_string(),
                table: "customers".to_string(),
                kind: RelationKind::BelongsTo,
                foreign_key: "customer_id".to_string(),
                owner_key: None,
            },
            RelationConfig {
                name: "items".to_string(),
                table: "order_items".to_string(),
                kind: RelationKind::HasMany,
                foreign_key: "order_id".to_string(),
                owner_key: None,
            },
        ],
        columns: vec![
            ColumnConfig::new("id").sortable(),
            ColumnConfig::new("name").sortable().searchable(),
            ColumnConfig::new("status").filterable().typed("select"),
            ColumnConfig::new("total").sortable().filterable().typed("number"),
            ColumnConfig::new("created_at").sortable().typed("date"),
            ColumnConfig::new("customer:name").sortable().searchable().filterable(),
            ColumnConfig::new("items:sku").filterable().typed("select"),
        ],
    })
    .expect("fixture registry is valid")
}

/// `count` orders. The first `active` are "active", the rest "archived".
pub fn orders(count: i64, active: i64) -> Vec<Row> {
    (1..=count)
        .map(|id| {
            let status = if id <= active { "active" } else { "archived" };
            row(&[
                ("id", Value::Int(id)),
                // Reverse name order so sorting by name differs from id order.
                ("name", Value::from(format!("order-{:03}", count - id))),
                ("status", Value::from(status)),
                ("total", Value::Int(id * 10)),
                ("created_at", Value::from(format!("2024-01-{:02}T10:00:00Z", (id - 1) % 28 + 1))),
                ("customer_id", Value::Int(id % 3 + 1)),
            ])
        })
        .collect()
}

pub fn customers() -> Vec<Row> {
    ["Carla", "ann", "Bob"]
        .iter()
        .zip(1..)
        .map(|(name, id)| row(&[("id", Value::Int(id)), ("name", Value::from(*name))]))
        .collect()
}

/// `per_order` items for each of orders `1..=orders`, all sharing one SKU.
pub fn items(orders: i64, per_order: i64) -> Vec<Row> {
    (1..=orders)
        .flat_map(|order| {
            (0..per_order).map(move |n| {
                row(&[
                    ("id", Value::Int(order * 100 + n)),
                    ("order_id", Value::Int(order)),
                    ("sku", Value::from("SKU-1")),
                ])
            })
        })
        .collect()
}

pub fn executor(orders_rows: Vec<Row>) -> Arc<InMemoryExecutor> {
    Arc::new(
        InMemoryExecutor::new()
            .with_table("orders", orders_rows)
            .with_table("customers", customers())
            .with_table("order_items", Vec::new()),
    )
}

pub fn session_for(
    principal: &str,
    executor: &Arc<InMemoryExecutor>,
    factory: &CacheFactory,
) -> TableSession {
    TableSession::new(
        &StaticIdentity::new(Scope::new(principal, "orders")),
        order_registry(),
        Arc::clone(executor) as Arc<dyn gridfetch_session::QueryExecutor>,
        factory,
        SessionConfig::default(),
    )
}

pub fn ids(page: &gridfetch_session::CachedResult) -> Vec<i64> {
    page.rows
        .iter()
        .filter_map(|r| match r.field("id") {
            Value::Int(i) => Some(*i),
            _ => None,
        })
        .collect()
}
