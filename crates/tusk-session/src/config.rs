//! Session configuration.

/// Configuration for Session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Loads of one member that trigger a batching warning.
    pub n1_threshold: usize,
    /// Whether eager and lazy loads are counted at all.
    pub track_loads: bool,
    /// Statements each data source retains for inspection.
    pub statement_log_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            n1_threshold: 3,
            track_loads: true,
            statement_log_limit: 256,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn n1_threshold(mut self, threshold: usize) -> Self {
        self.n1_threshold = threshold;
        self
    }

    #[must_use]
    pub fn track_loads(mut self, enabled: bool) -> Self {
        self.track_loads = enabled;
        self
    }

    #[must_use]
    pub fn statement_log_limit(mut self, limit: usize) -> Self {
        self.statement_log_limit = limit;
        self
    }
}
