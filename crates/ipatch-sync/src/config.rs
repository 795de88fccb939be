//! File configuration.

use ipatch_history::DEFAULT_HISTORY_CAPACITY;

/// Configuration shared by master and slave files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileConfig {
    /// How many past states a file retains. Bounds how stale a slave may be
    /// before the master answers with a full resync instead of a forward.
    pub history_capacity: usize,
    /// How many unread change events a subscriber may lag behind.
    pub event_capacity: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_capacity: 100,
        }
    }
}

/// Builder for file configuration.
pub struct FileConfigBuilder {
    config: FileConfig,
}

impl FileConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FileConfig::default(),
        }
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> FileConfig {
        self.config
    }
}

impl Default for FileConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
