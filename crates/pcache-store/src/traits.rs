use std::sync::Arc;

use async_trait::async_trait;
use pcache_types::ContentId;

use crate::error::StoreResult;

/// Trait-object version of [`BlockStore`].
pub type DynBlockStore = Arc<dyn BlockStore>;

/// Content-addressed block store capability.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written.
/// - `store` of byte-identical data always returns the same identifier.
/// - `fetch` returns `Ok(None)` only when the store definitively has no block
///   under that identifier; transport or backend faults are `Err`.
/// - No retries: faults are reported to the caller, who owns retry policy.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fetch a block by its identifier.
    async fn fetch(&self, id: &ContentId) -> StoreResult<Option<Vec<u8>>>;

    /// Store a block and return its identifier.
    ///
    /// Storing a block that already exists is a no-op that returns the
    /// existing identifier.
    async fn store(&self, data: &[u8]) -> StoreResult<ContentId>;

    /// Check whether a block exists.
    async fn contains(&self, id: &ContentId) -> StoreResult<bool> {
        Ok(self.fetch(id).await?.is_some())
    }
}
