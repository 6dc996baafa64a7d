//! Record store configuration.

/// Configuration for opening a record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to fsync the log after every mutation.
    ///
    /// Turning this off trades the durability guarantee of `put` and
    /// `delete` for throughput. Only tests and benchmarks should do so.
    pub sync_on_write: bool,

    /// Log size above which the store compacts itself (0 = never).
    ///
    /// Compaction also requires the log to be at least twice the size of
    /// its live frames, so a large but dense log is left alone.
    pub compact_threshold_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compact_threshold_bytes: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to fsync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the auto-compaction threshold in bytes (0 disables).
    #[must_use]
    pub const fn compact_threshold_bytes(mut self, bytes: u64) -> Self {
        self.compact_threshold_bytes = bytes;
        self
    }

    /// Returns true if automatic compaction is enabled.
    #[must_use]
    pub const fn auto_compaction(&self) -> bool {
        self.compact_threshold_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_durable() {
        let config = StoreConfig::default();
        assert!(config.sync_on_write);
        assert_eq!(config.compact_threshold_bytes, 4 * 1024 * 1024);
        assert!(config.auto_compaction());
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .sync_on_write(false)
            .compact_threshold_bytes(0);
        assert!(!config.sync_on_write);
        assert!(!config.auto_compaction());
    }
}
