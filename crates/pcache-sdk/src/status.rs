use serde::{Deserialize, Serialize};

use pcache_cache::Cache;

/// Point-in-time summary of a cache, for logs and status endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub name: String,
    pub state: String,
    /// Hex-encoded root, absent while the index is empty.
    pub root: Option<String>,
    pub queued: usize,
}

impl CacheStatus {
    pub(crate) fn of(cache: &Cache) -> Self {
        Self {
            name: cache.name(),
            state: cache.state().to_string(),
            root: cache.current_root().map(|id| id.to_hex()),
            queued: cache.queued(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
