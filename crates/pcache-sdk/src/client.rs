use pcache_cache::{Cache, CacheConfig};
use pcache_index::IndexValue;
use pcache_names::DynNameService;
use pcache_store::DynBlockStore;
use pcache_types::ContentId;

use crate::error::{SdkError, SdkResult};
use crate::status::CacheStatus;

fn check_key(key: &str) -> SdkResult<()> {
    if key.is_empty() {
        return Err(SdkError::InvalidKey("key must not be empty".into()));
    }
    Ok(())
}

/// Read-only view over a published index.
///
/// A client follows a name someone else publishes. Give it a
/// `refresh_interval` to keep up with new snapshots.
pub struct Client {
    cache: Cache,
}

impl Client {
    pub fn new(store: DynBlockStore, names: DynNameService, config: CacheConfig) -> SdkResult<Self> {
        Ok(Self {
            cache: Cache::new(store, names, config)?,
        })
    }

    /// The name this client follows.
    pub fn name(&self) -> String {
        self.cache.name()
    }

    pub async fn get_content(&self, key: &str) -> SdkResult<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.cache.get_content(key).await?)
    }

    pub fn current_root(&self) -> Option<ContentId> {
        self.cache.current_root()
    }

    pub async fn wait_for_db_update(&self) -> SdkResult<Option<ContentId>> {
        Ok(self.cache.wait_for_db_update().await?)
    }

    /// Re-resolve the followed name now. Returns `true` if a newer snapshot
    /// was adopted.
    pub async fn refresh(&self) -> SdkResult<bool> {
        Ok(self.cache.refresh().await?)
    }

    /// All keys in the current snapshot, sorted.
    pub async fn keys(&self) -> SdkResult<Vec<String>> {
        let entries = self.cache.entries().await?;
        Ok(entries.into_iter().map(|(key, _)| key).collect())
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus::of(&self.cache)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("cache", &self.cache).finish()
    }
}

/// Read-write view: inserts content and publishes the index under this
/// node's own name.
pub struct Injector {
    client: Client,
}

impl Injector {
    /// Create an injector bound to `config.name`, or to the naming service's
    /// local name.
    pub fn new(store: DynBlockStore, names: DynNameService, config: CacheConfig) -> SdkResult<Self> {
        Ok(Self {
            client: Client::new(store, names, config)?,
        })
    }

    /// The name readers resolve to find this injector's index.
    pub fn ipns_id(&self) -> String {
        self.client.name()
    }

    /// Store `content` and index it under `key`. Returns the content handle.
    pub async fn insert_content(&self, key: &str, content: &[u8]) -> SdkResult<ContentId> {
        check_key(key)?;
        let handle = self.client.cache.insert_content(key, content).await?;
        tracing::debug!(key, handle = %handle.short_hex(), "content injected");
        Ok(handle)
    }

    /// Index a small value inline, without a separate content block.
    pub async fn insert_inline(&self, key: &str, value: &[u8]) -> SdkResult<ContentId> {
        check_key(key)?;
        let root = self
            .client
            .cache
            .update(key, IndexValue::Inline(value.to_vec()))
            .await?;
        Ok(root)
    }

    pub async fn get_content(&self, key: &str) -> SdkResult<Option<Vec<u8>>> {
        self.client.get_content(key).await
    }

    pub fn current_root(&self) -> Option<ContentId> {
        self.client.current_root()
    }

    pub async fn wait_for_db_update(&self) -> SdkResult<Option<ContentId>> {
        self.client.wait_for_db_update().await
    }

    pub async fn keys(&self) -> SdkResult<Vec<String>> {
        self.client.keys().await
    }

    pub fn status(&self) -> CacheStatus {
        self.client.status()
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector").field("client", &self.client).finish()
    }
}
