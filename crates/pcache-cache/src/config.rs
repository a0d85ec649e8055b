use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Configuration for a [`Cache`](crate::Cache).
///
/// ```toml
/// name = "k51qzi5uqu5d"
/// refresh_interval_ms = 30000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Name to bind to. Defaults to the naming service's local name.
    pub name: Option<String>,
    /// How often to re-resolve the name to pick up roots published by
    /// other peers. No background refresh when absent.
    pub refresh_interval_ms: Option<u64>,
}

impl CacheConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(s: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CacheError::Config(e.to_string()))?;
        if config.refresh_interval_ms == Some(0) {
            return Err(CacheError::Config(
                "refresh_interval_ms must be positive".into(),
            ));
        }
        Ok(config)
    }

    /// Builder: bind to an explicit name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: enable background refresh.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = Some(interval.as_millis().max(1) as u64);
        self
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms.map(Duration::from_millis)
    }
}
