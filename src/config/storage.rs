//! Storage configuration.

use serde::Deserialize;

/// Persistence settings for pairs, opportunities, stats and settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "scanner.db".to_string(),
            max_connections: 5,
        }
    }
}
