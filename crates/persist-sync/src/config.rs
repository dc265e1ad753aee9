use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for reconciliation batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Delete objects missing from the incoming document before filling.
    pub delete_orphans: bool,
    /// Parse raw JSON bytes on a blocking worker thread instead of inline.
    pub parse_in_background: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            delete_orphans: true,
            parse_in_background: true,
        }
    }
}

impl PersistConfig {
    /// Load a configuration file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
