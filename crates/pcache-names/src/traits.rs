//! The [`NameService`] capability trait.

use std::sync::Arc;

use async_trait::async_trait;
use pcache_types::ContentId;

use crate::error::Result;

/// Trait-object version of [`NameService`].
pub type DynNameService = Arc<dyn NameService>;

/// Resolves and publishes mutable names.
///
/// Implementations must be thread-safe and must never retry on their own;
/// timeouts, if any, are the implementation's policy.
#[async_trait]
pub trait NameService: Send + Sync {
    /// Resolve a name to the identifier it currently points at.
    ///
    /// Returns `Ok(None)` if nothing has been published under the name yet.
    async fn resolve(&self, name: &str) -> Result<Option<ContentId>>;

    /// Repoint `name` at `target`.
    async fn publish(&self, name: &str, target: ContentId) -> Result<()>;

    /// The name this node publishes under by default.
    fn local_name(&self) -> String;
}
