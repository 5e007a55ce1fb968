/// Refresh cadence and cache TTL configuration. Constructed by the caller; this
/// crate parses no configuration file itself (that layer is an external
/// collaborator, see the crate's top-level docs).
#[derive(Debug, Clone, Copy)]
pub struct RefreshParameter {
    /// Minimum gap between the start of two refresh cycles.
    pub interval_seconds: u64,
    /// Maximum number of candidate paths handed to a single batch.
    pub batch_size: usize,
    /// Backoff before a path in the failed-open table is retried.
    pub retry_invalid_seconds: u64,
    /// TTL for a cache entry that refers to no live plot.
    pub expiry_seconds: u64,
}

impl Default for RefreshParameter {
    fn default() -> Self {
        Self {
            interval_seconds: 120,
            batch_size: 25,
            retry_invalid_seconds: 1200,
            expiry_seconds: 3600,
        }
    }
}
