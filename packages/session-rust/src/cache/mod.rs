//! Caching layer: scoped stores, fingerprints, page results, and filter
//! option lists.

pub mod distinct;
pub mod factory;
pub mod fingerprint;
pub mod result;
pub mod store;

pub use distinct::{DistinctStore, DistinctValueCache, DistinctValueSet};
pub use factory::CacheFactory;
pub use fingerprint::Fingerprint;
pub use result::{
    CachedResult, InflightSlot, InflightTable, PageMeta, ResultCache, ResultStore,
};
pub use store::{CacheStore, QuickCacheStore, ScopedKey};
