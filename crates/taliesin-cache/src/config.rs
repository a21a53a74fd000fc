//! Configuration for the update cache.

use std::time::Duration;

/// Default maximum number of resident entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Default idle TTL before an entry is evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for [`crate::UpdateCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum resident entries before LRU eviction.
    pub max_entries: usize,

    /// Idle time-to-live. Access refreshes an entry's age; `None` disables
    /// expiry.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: Some(DEFAULT_TTL),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum resident entry count.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the idle TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable TTL expiry.
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }
}
