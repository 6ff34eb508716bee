//! Kernel configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Categories registered on open, in addition to the defaults.
    /// Labels that already exist are skipped.
    pub extra_categories: Vec<String>,
    /// Buffer size of the event broadcast channel. Slow subscribers lag
    /// once this many events are pending.
    pub event_channel_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            extra_categories: Vec::new(),
            event_channel_capacity: 256,
        }
    }
}
