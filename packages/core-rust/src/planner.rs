//! Eager-load planning.
//!
//! Decides which relations must be fetched alongside a page of base rows so
//! that displaying relation-backed columns costs one batch per relation
//! instead of one query per row. A plan that lags behind the visible columns
//! reintroduces per-row fetching, so callers recompute it whenever visibility
//! or the active filter target changes.

use std::collections::BTreeSet;

use crate::registry::{ColumnRegistry, RelationLink};

/// Relation names needed by the visible columns plus the active filter target.
///
/// Keys in `visible` that are not registered are ignored. The filter target
/// contributes its relation even when its column is hidden, since the
/// filtered-on data is shown in the filter control.
#[must_use]
pub fn plan_relations(
    visible: &BTreeSet<String>,
    filter_target: Option<&str>,
    registry: &ColumnRegistry,
) -> BTreeSet<String> {
    let visible_relations = registry
        .columns()
        .iter()
        .filter(|c| visible.contains(&c.key))
        .filter_map(|c| c.source.relation());

    let filter_relation = filter_target
        .filter(|key| registry.is_filterable(key))
        .and_then(|key| registry.resolve(key))
        .and_then(|source| source.relation());

    visible_relations
        .chain(filter_relation)
        .map(str::to_string)
        .collect()
}

/// Resolves planned relation names to their links, in name order.
#[must_use]
pub fn relation_links(plan: &BTreeSet<String>, registry: &ColumnRegistry) -> Vec<RelationLink> {
    plan.iter()
        .filter_map(|name| registry.relation(name).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnConfig, RelationConfig, RelationKind, TableConfig};
    use crate::RegistryHandle;

    fn registry() -> RegistryHandle {
        ColumnRegistry::register(&TableConfig {
            model: "Order".to_string(),
            table: "orders".to_string(),
            primary_key: "id".to_string(),
            date_column: None,
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
                ColumnConfig::new("id"),
                ColumnConfig::new("customer:name").searchable(),
                ColumnConfig::new("customer:email"),
                ColumnConfig::new("items:sku").filterable(),
            ],
        })
        .unwrap()
    }

    fn keys(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn collects_distinct_relations_of_visible_columns() {
        let plan = plan_relations(
            &keys(&["id", "customer:name", "customer:email"]),
            None,
            &registry(),
        );
        assert_eq!(plan, keys(&["customer"]));
    }

    #[test]
    fn direct_only_view_plans_nothing() {
        assert!(plan_relations(&keys(&["id"]), None, &registry()).is_empty());
    }

    #[test]
    fn hidden_filter_target_is_included() {
        let plan = plan_relations(&keys(&["id"]), Some("items:sku"), &registry());
        assert_eq!(plan, keys(&["items"]));
    }

    #[test]
    fn unknown_or_unfilterable_targets_are_ignored() {
        let registry = registry();
        assert!(plan_relations(&keys(&["ghost"]), Some("ghost"), &registry).is_empty());
        // customer:email is registered but not filterable.
        assert!(plan_relations(&keys(&[]), Some("customer:email"), &registry).is_empty());
    }

    #[test]
    fn plan_changes_with_visibility() {
        let registry = registry();
        let before = plan_relations(&keys(&["customer:name"]), None, &registry);
        let after = plan_relations(&keys(&["customer:name", "items:sku"]), None, &registry);
        assert_ne!(before, after);
        assert_eq!(after, keys(&["customer", "items"]));
    }

    #[test]
    fn relation_links_follow_plan_order() {
        let registry = registry();
        let links = relation_links(&keys(&["items", "customer"]), &registry);
        let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["customer", "items"]);
    }
}
