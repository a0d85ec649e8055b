//! In-memory name service for testing and ephemeral use.
//!
//! A [`NameRegistry`] holds the records; several [`InMemoryNameService`]
//! handles, each with its own local name, can share one registry to model
//! peers that publish under their own key and resolve each other's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use pcache_types::ContentId;
use tracing::debug;

use crate::error::{NameError, Result};
use crate::names::validate_name;
use crate::traits::NameService;

/// Shared table of published names.
#[derive(Debug, Default)]
pub struct NameRegistry {
    records: RwLock<HashMap<String, ContentId>>,
}

impl NameRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current target of `name`, if any.
    pub fn get(&self, name: &str) -> Option<ContentId> {
        self.records.read().expect("lock poisoned").get(name).copied()
    }

    /// Point `name` at `target` directly, bypassing ownership checks.
    pub fn set(&self, name: &str, target: ContentId) {
        self.records
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), target);
    }
}

/// An in-memory implementation of [`NameService`].
///
/// A handle may only publish under its own local name, as with key-based
/// naming systems where the name is derived from the publisher's key.
#[derive(Debug)]
pub struct InMemoryNameService {
    registry: Arc<NameRegistry>,
    local_name: String,
    offline: AtomicBool,
    reject_publish: AtomicBool,
    publishes: AtomicU64,
}

impl InMemoryNameService {
    /// Create a service with a fresh registry.
    pub fn new(local_name: impl Into<String>) -> Self {
        Self::with_registry(Arc::new(NameRegistry::new()), local_name)
    }

    /// Create a service over an existing registry.
    pub fn with_registry(registry: Arc<NameRegistry>, local_name: impl Into<String>) -> Self {
        Self {
            registry,
            local_name: local_name.into(),
            offline: AtomicBool::new(false),
            reject_publish: AtomicBool::new(false),
            publishes: AtomicU64::new(0),
        }
    }

    /// A handle for another peer sharing this service's registry.
    pub fn peer(&self, local_name: impl Into<String>) -> Self {
        Self::with_registry(Arc::clone(&self.registry), local_name)
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    /// Make resolve and publish fail as if the service were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make publish fail while resolve keeps working.
    pub fn set_reject_publish(&self, reject: bool) {
        self.reject_publish.store(reject, Ordering::SeqCst);
    }

    /// Number of successful publishes through this handle.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameService for InMemoryNameService {
    async fn resolve(&self, name: &str) -> Result<Option<ContentId>> {
        validate_name(name)?;
        if self.offline.load(Ordering::SeqCst) {
            return Err(NameError::ResolveFailed {
                name: name.to_string(),
                reason: "name service offline".into(),
            });
        }
        Ok(self.registry.get(name))
    }

    async fn publish(&self, name: &str, target: ContentId) -> Result<()> {
        validate_name(name)?;
        let reason = if self.offline.load(Ordering::SeqCst) {
            Some("name service offline".to_string())
        } else if self.reject_publish.load(Ordering::SeqCst) {
            Some("publish rejected".to_string())
        } else if name != self.local_name {
            Some(format!("not the owner (local name is {})", self.local_name))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(NameError::PublishFailed {
                name: name.to_string(),
                reason,
            });
        }

        self.registry.set(name, target);
        self.publishes.fetch_add(1, Ordering::SeqCst);
        debug!(name, target = %target.short_hex(), "name published");
        Ok(())
    }

    fn local_name(&self) -> String {
        self.local_name.clone()
    }
}
