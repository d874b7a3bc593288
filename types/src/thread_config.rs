//! Immutable launch configuration shared by every worker thread.

use serde::{Deserialize, Serialize};

use crate::StackSize;

/// Settings read by each launch. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub stack_size: StackSize,
    /// Threads are named `{name_prefix}-{id}`.
    pub name_prefix: String,
    /// Capacity of the table backing independently-owned handles.
    pub max_tracked: usize,
    /// Cap on concurrently running threads; `None` leaves it to the OS.
    pub max_live: Option<usize>,
}

impl ThreadConfig {
    pub const DEFAULT_NAME_PREFIX: &'static str = "courier-worker";
    pub const DEFAULT_MAX_TRACKED: usize = 4096;

    #[must_use]
    pub fn with_stack_size(mut self, stack_size: StackSize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked;
        self
    }

    #[must_use]
    pub fn with_max_live(mut self, max_live: Option<usize>) -> Self {
        self.max_live = max_live;
        self
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stack_size: StackSize::DEFAULT,
            name_prefix: Self::DEFAULT_NAME_PREFIX.to_string(),
            max_tracked: Self::DEFAULT_MAX_TRACKED,
            max_live: None,
        }
    }
}
