use gridfetch_core::DEFAULT_PAGE_SIZE;

/// Sizing and expiry of the shared cache stores.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached page in milliseconds (0 = no expiry).
    pub result_ttl_ms: u64,
    /// Capacity of the result store across all scopes.
    pub max_result_entries: usize,
    /// Capacity of the distinct-value store across all scopes.
    pub max_distinct_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_ttl_ms: 300_000,
            max_result_entries: 10_000,
            max_distinct_entries: 1_000,
        }
    }
}

/// Per-session limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Page size a new session starts with.
    pub default_page_size: u32,
    /// Upper bound for user-selected page sizes.
    pub max_page_size: u32,
    /// Maximum number of options returned for one filter control.
    pub distinct_value_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 100,
            distinct_value_limit: 1_000,
        }
    }
}
