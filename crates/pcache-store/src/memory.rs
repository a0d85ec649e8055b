use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use pcache_crypto::ContentHasher;
use pcache_types::ContentId;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;

/// Call counters of an [`InMemoryBlockStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `fetch` calls served.
    pub fetches: u64,
    /// Number of `store` calls served.
    pub stores: u64,
}

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock` and
/// cloned on read. The store counts calls so tests can assert how much
/// traffic an operation generated, and can be switched offline or read-only
/// to exercise fault paths.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<ContentId, Vec<u8>>>,
    fetches: AtomicU64,
    stores: AtomicU64,
    offline: AtomicBool,
    read_only: AtomicBool,
}

impl InMemoryBlockStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            fetches: self.fetches.load(Ordering::SeqCst),
            stores: self.stores.load(Ordering::SeqCst),
        }
    }

    /// Reset the call counters to zero.
    pub fn reset_stats(&self) {
        self.fetches.store(0, Ordering::SeqCst);
        self.stores.store(0, Ordering::SeqCst);
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every subsequent `store` fail with [`StoreError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Insert raw bytes under an arbitrary identifier, bypassing hashing.
    ///
    /// Only useful for simulating a misbehaving backend in tests.
    pub fn insert_raw(&self, id: ContentId, data: Vec<u8>) {
        self.blocks.write().expect("lock poisoned").insert(id, data);
    }

    /// Remove a block. Returns `true` if it existed.
    pub fn remove(&self, id: &ContentId) -> bool {
        self.blocks.write().expect("lock poisoned").remove(id).is_some()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn fetch(&self, id: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    async fn store(&self, data: &[u8]) -> StoreResult<ContentId> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }
        let id = ContentHasher::BLOCK.hash(data);
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| data.to_vec());
        trace!(id = %id.short_hex(), size = data.len(), "block stored");
        Ok(id)
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
