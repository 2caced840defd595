//! Error types surfaced by table sessions and caches.

use std::collections::BTreeSet;

use gridfetch_core::ConfigurationError;
use thiserror::Error;

/// Errors returned to the host from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The executor failed. Nothing was cached; previous entries stay valid.
    #[error("data source failed: {0:#}")]
    DataSource(anyhow::Error),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Fingerprint input could not be encoded.
    #[error("failed to encode fingerprint input: {0}")]
    Fingerprint(#[from] rmp_serde::encode::Error),
}

/// A cached page that fails structural validation on read.
///
/// Never returned to callers: the entry is logged, discarded, and recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheCorruptionError {
    #[error("stored fingerprint {stored} does not match lookup key {expected}")]
    FingerprintMismatch { expected: String, stored: String },

    #[error("page {stored_page}x{stored_size} does not match requested page {page}x{size}")]
    PageMismatch {
        page: u32,
        size: u32,
        stored_page: u32,
        stored_size: u32,
    },

    #[error("{rows} rows exceed page size {size}")]
    Oversized { rows: usize, size: u32 },

    #[error("{rows} rows exceed total count {total}")]
    CountBelowRows { rows: usize, total: u64 },

    #[error("loaded relations {loaded:?} differ from planned {planned:?}")]
    RelationsMismatch {
        planned: BTreeSet<String>,
        loaded: BTreeSet<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_error_keeps_context_chain() {
        let err = SessionError::DataSource(
            anyhow::anyhow!("connection reset").context("loading page of orders"),
        );
        assert_eq!(
            err.to_string(),
            "data source failed: loading page of orders: connection reset"
        );
    }

    #[test]
    fn configuration_error_is_transparent() {
        let err: SessionError = ConfigurationError::EmptyKey.into();
        assert_eq!(err.to_string(), ConfigurationError::EmptyKey.to_string());
    }

    #[test]
    fn corruption_messages_name_the_mismatch() {
        let err = CacheCorruptionError::CountBelowRows { rows: 5, total: 2 };
        assert_eq!(err.to_string(), "5 rows exceed total count 2");
    }
}
