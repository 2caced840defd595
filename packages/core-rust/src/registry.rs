//! Column/relation registry: the validated lookup table built from a
//! [`TableConfig`].
//!
//! Every identifier that may end up inside a query (table names, field names,
//! relation keys) passes through [`ColumnRegistry::register`] exactly once.
//! Downstream components never parse raw `"relation:attribute"` strings; they
//! resolve keys here and work with the parsed [`ColumnSource`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::schema::{ColumnConfig, RelationConfig, RelationKind, TableConfig};
use crate::state::{FilterOperator, SortDirection};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Shared, immutable handle to a registered table.
pub type RegistryHandle = Arc<ColumnRegistry>;

// ---------------------------------------------------------------------------
// Column types
// ---------------------------------------------------------------------------

/// Declared value type of a column. Determines which filter operators apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Number,
    Date,
    Select,
}

impl ValueType {
    /// Parses a configured type name. Matching is case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "select" => Some(Self::Select),
            _ => None,
        }
    }

    /// Operators a filter on a column of this type may use.
    #[must_use]
    pub fn allowed_operators(self) -> &'static [FilterOperator] {
        match self {
            Self::Text => &[FilterOperator::Contains],
            Self::Number => &[
                FilterOperator::Eq,
                FilterOperator::Gt,
                FilterOperator::Lt,
                FilterOperator::Gte,
                FilterOperator::Lte,
                FilterOperator::Neq,
            ],
            Self::Date => &[FilterOperator::On, FilterOperator::Between],
            Self::Select => &[FilterOperator::OneOf],
        }
    }

    /// Operator used when the client did not pick one.
    #[must_use]
    pub fn default_operator(self) -> FilterOperator {
        self.allowed_operators()[0]
    }

    #[must_use]
    pub fn allows(self, op: FilterOperator) -> bool {
        self.allowed_operators().contains(&op)
    }
}

/// Where a column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSource {
    /// A field on the base table.
    Direct { field: String },
    /// An attribute of a related table, one hop away.
    Relation { relation: String, attribute: String },
}

impl ColumnSource {
    /// Relation name for relation-backed columns.
    #[must_use]
    pub fn relation(&self) -> Option<&str> {
        match self {
            Self::Direct { .. } => None,
            Self::Relation { relation, .. } => Some(relation),
        }
    }
}

/// Capability flags of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnFlags {
    pub sortable: bool,
    pub searchable: bool,
    pub filterable: bool,
}

/// A validated, immutable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub key: String,
    pub label: String,
    pub source: ColumnSource,
    pub flags: ColumnFlags,
    pub value_type: Option<ValueType>,
}

impl ColumnDescriptor {
    /// Value type used for filtering; undeclared columns behave as text.
    #[must_use]
    pub fn effective_type(&self) -> ValueType {
        self.value_type.unwrap_or(ValueType::Text)
    }
}

/// A relation normalized to a single equality between two fields:
/// `related.related_key = base.base_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationLink {
    pub name: String,
    pub table: String,
    pub kind: RelationKind,
    /// Field on the base table.
    pub base_key: String,
    /// Field on the related table.
    pub related_key: String,
}

// ---------------------------------------------------------------------------
// ColumnRegistry
// ---------------------------------------------------------------------------

/// The single source of truth for what may be interpolated into a query.
#[derive(Debug)]
pub struct ColumnRegistry {
    model: String,
    table: String,
    primary_key: String,
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
    relations: BTreeMap<String, RelationLink>,
    date_column: Option<usize>,
    default_sort: Option<(usize, SortDirection)>,
}

impl ColumnRegistry {
    /// Validates `config` and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for empty or duplicate keys, relation
    /// paths with more than one hop, unrecognized value types, identifiers that
    /// are unsafe to place in a query, references to undeclared relations, and
    /// date/default-sort columns that are not registered.
    pub fn register(config: &TableConfig) -> Result<RegistryHandle, ConfigurationError> {
        check_identifier("table", &config.table)?;
        check_identifier("primary key", &config.primary_key)?;

        let mut relations = BTreeMap::new();
        for relation in &config.relations {
            let link = relation_link(relation)?;
            if relations.insert(link.name.clone(), link).is_some() {
                return Err(ConfigurationError::DuplicateRelation {
                    name: relation.name.clone(),
                });
            }
        }

        let mut columns = Vec::with_capacity(config.columns.len());
        let mut index = HashMap::with_capacity(config.columns.len());
        for column in &config.columns {
            let descriptor = describe_column(column, &relations)?;
            if index.contains_key(&descriptor.key) {
                return Err(ConfigurationError::DuplicateKey {
                    key: descriptor.key,
                });
            }
            index.insert(descriptor.key.clone(), columns.len());
            columns.push(descriptor);
        }

        let date_column = match &config.date_column {
            Some(key) => Some(
                *index
                    .get(key)
                    .ok_or_else(|| ConfigurationError::UnknownDateColumn { key: key.clone() })?,
            ),
            None => None,
        };

        let default_sort = match &config.default_sort {
            Some(sort) => {
                let idx = index
                    .get(&sort.column)
                    .copied()
                    .filter(|&i| columns[i].flags.sortable)
                    .ok_or_else(|| ConfigurationError::UnknownDefaultSort {
                        key: sort.column.clone(),
                    })?;
                Some((idx, sort.direction))
            }
            None => None,
        };

        tracing::debug!(
            model = %config.model,
            columns = columns.len(),
            relations = relations.len(),
            "registered table columns"
        );

        Ok(Arc::new(Self {
            model: config.model.clone(),
            table: config.table.clone(),
            primary_key: config.primary_key.clone(),
            columns,
            index,
            relations,
            date_column,
            default_sort,
        }))
    }

    /// Model identity of the base table.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// All columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, key: &str) -> Option<&ColumnDescriptor> {
        self.index.get(key).map(|&i| &self.columns[i])
    }

    /// Resolves a column key to its source.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&ColumnSource> {
        self.column(key).map(|c| &c.source)
    }

    #[must_use]
    pub fn is_sortable(&self, key: &str) -> bool {
        self.column(key).is_some_and(|c| c.flags.sortable)
    }

    #[must_use]
    pub fn is_searchable(&self, key: &str) -> bool {
        self.column(key).is_some_and(|c| c.flags.searchable)
    }

    #[must_use]
    pub fn is_filterable(&self, key: &str) -> bool {
        self.column(key).is_some_and(|c| c.flags.filterable)
    }

    /// Looks up a declared relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationLink> {
        self.relations.get(name)
    }

    /// The configured date-range column, if any.
    #[must_use]
    pub fn date_column(&self) -> Option<&ColumnDescriptor> {
        self.date_column.map(|i| &self.columns[i])
    }

    /// The configured default ordering, if any.
    #[must_use]
    pub fn default_sort(&self) -> Option<(&ColumnDescriptor, SortDirection)> {
        self.default_sort.map(|(i, dir)| (&self.columns[i], dir))
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn check_identifier(context: &'static str, identifier: &str) -> Result<(), ConfigurationError> {
    if IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidIdentifier {
            context,
            identifier: identifier.to_string(),
        })
    }
}

fn relation_link(relation: &RelationConfig) -> Result<RelationLink, ConfigurationError> {
    check_identifier("relation name", &relation.name)?;
    check_identifier("relation table", &relation.table)?;
    check_identifier("foreign key", &relation.foreign_key)?;
    let owner_key = relation.owner_key.clone().unwrap_or_else(|| "id".to_string());
    check_identifier("owner key", &owner_key)?;

    let (base_key, related_key) = match relation.kind {
        RelationKind::BelongsTo => (relation.foreign_key.clone(), owner_key),
        RelationKind::HasMany => (owner_key, relation.foreign_key.clone()),
    };
    Ok(RelationLink {
        name: relation.name.clone(),
        table: relation.table.clone(),
        kind: relation.kind,
        base_key,
        related_key,
    })
}

/// Parses a column key into its source. Relation paths are `relation:attribute`;
/// nested relations (`a.b:attr`) and chained paths (`a:b:attr`) are rejected.
fn parse_key(key: &str) -> Result<ColumnSource, ConfigurationError> {
    if key.is_empty() {
        return Err(ConfigurationError::EmptyKey);
    }
    let parts: Vec<&str> = key.split(':').collect();
    match parts.as_slice() {
        [field] => {
            check_identifier("column field", field)?;
            Ok(ColumnSource::Direct {
                field: (*field).to_string(),
            })
        }
        [relation, attribute] => {
            if relation.contains('.') {
                return Err(ConfigurationError::MultiHopRelation {
                    key: key.to_string(),
                });
            }
            check_identifier("relation name", relation)?;
            check_identifier("relation attribute", attribute)?;
            Ok(ColumnSource::Relation {
                relation: (*relation).to_string(),
                attribute: (*attribute).to_string(),
            })
        }
        _ => Err(ConfigurationError::MultiHopRelation {
            key: key.to_string(),
        }),
    }
}

fn describe_column(
    column: &ColumnConfig,
    relations: &BTreeMap<String, RelationLink>,
) -> Result<ColumnDescriptor, ConfigurationError> {
    let source = parse_key(&column.key)?;
    if let Some(relation) = source.relation() {
        if !relations.contains_key(relation) {
            return Err(ConfigurationError::UnknownRelation {
                key: column.key.clone(),
                relation: relation.to_string(),
            });
        }
    }

    let value_type = match &column.value_type {
        Some(raw) => Some(ValueType::parse(raw).ok_or_else(|| {
            ConfigurationError::UnknownValueType {
                key: column.key.clone(),
                value_type: raw.clone(),
            }
        })?),
        None => None,
    };

    Ok(ColumnDescriptor {
        key: column.key.clone(),
        label: column.label.clone().unwrap_or_else(|| column.key.clone()),
        source,
        flags: ColumnFlags {
            sortable: column.sortable,
            searchable: column.searchable,
            filterable: column.filterable,
        },
        value_type,
    })
}
