//! `gridfetch` Core: column registry, interaction state, query assembly, and
//! eager-load planning for interactive tables.

pub mod assembler;
pub mod clock;
pub mod error;
pub mod planner;
pub mod query;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod sql;
pub mod state;
pub mod types;

pub use assembler::{build, build_distinct};
pub use clock::{ClockSource, SystemClock};
pub use error::{ConfigurationError, KeyOrigin, UnknownKeyWarning};
pub use planner::{plan_relations, relation_links};
pub use query::{
    Aggregate, Comparison, Condition, CountQuery, DistinctQuery, OrderBy, Pagination, Predicate,
    QuerySpec, SortKey,
};
pub use registry::{
    ColumnDescriptor, ColumnFlags, ColumnRegistry, ColumnSource, RegistryHandle, RelationLink,
    ValueType,
};
pub use schema::{ColumnConfig, RelationConfig, RelationKind, SortConfig, TableConfig};
pub use scope::{IdentityProvider, Principal, Scope, StaticIdentity};
pub use sql::SqlStatement;
pub use state::{FilterOperator, FilterValue, InteractionState, SortDirection, DEFAULT_PAGE_SIZE};
pub use types::{Row, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
