//! Database configuration

use serde::{Deserialize, Serialize};

/// Tuning for conflict handling.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// How many revisions of each history are searched for a common
    /// ancestor, counting the revision itself
    pub max_ancestor_depth: usize,

    /// How many resolve-and-retry passes one save may make
    pub conflict_resolution_passes: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: 20,
            conflict_resolution_passes: 1,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with a custom ancestor search depth.
    pub fn with_max_ancestor_depth(depth: usize) -> Self {
        Self {
            max_ancestor_depth: depth,
            ..Default::default()
        }
    }

    /// Create a config with a custom number of resolution passes.
    /// Zero disables conflict resolution: every conflict fails the save.
    pub fn with_conflict_resolution_passes(passes: usize) -> Self {
        Self {
            conflict_resolution_passes: passes,
            ..Default::default()
        }
    }

    /// Parse a config from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
