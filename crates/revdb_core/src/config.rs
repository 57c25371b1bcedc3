//! Storage instance configuration.

/// Configuration for a storage instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Events buffered per change-feed subscriber before the oldest is dropped.
    pub change_buffer_capacity: usize,

    /// Events retained for cursor polling.
    pub change_history: usize,

    /// Whether the authoritative state's revision is re-derived on every write.
    pub verify_stored_revisions: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            change_buffer_capacity: 1024,
            change_history: 10_000,
            verify_stored_revisions: true,
        }
    }
}

impl InstanceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-subscriber change buffer capacity (minimum 1).
    #[must_use]
    pub const fn change_buffer_capacity(mut self, capacity: usize) -> Self {
        self.change_buffer_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Sets how many events are retained for polling.
    #[must_use]
    pub const fn change_history(mut self, events: usize) -> Self {
        self.change_history = events;
        self
    }

    /// Sets whether stored revisions are verified before each write.
    #[must_use]
    pub const fn verify_stored_revisions(mut self, value: bool) -> Self {
        self.verify_stored_revisions = value;
        self
    }
}
