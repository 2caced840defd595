//! `gridfetch` Session: result and distinct-value caching, single-flight
//! execution, and the host-facing table session.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod session;

pub use cache::{CacheFactory, CachedResult, Fingerprint, PageMeta};
pub use config::{CacheConfig, SessionConfig};
pub use error::{CacheCorruptionError, SessionError};
pub use executor::{ExecutorStats, InMemoryExecutor, QueryExecutor, QueryOutput, ResultRow};
pub use logging::{init_logging, LogFormat};
pub use session::{SessionPhase, TableSession};
