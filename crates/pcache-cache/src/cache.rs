use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pcache_index::{IndexError, IndexTree, IndexValue};
use pcache_names::{validate_name, DynNameService};
use pcache_store::DynBlockStore;
use pcache_types::ContentId;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::state::{CacheState, QueuedOp};

/// State guarded by the short-lived cache mutex. Never held across `.await`.
struct Shared {
    phase: CacheState,
    name: String,
    /// Bumped on every rebind; work started under an older generation must
    /// not touch the current binding.
    generation: u64,
    root: Option<ContentId>,
    /// Last root known to be visible under `name`.
    published: Option<ContentId>,
    queue: VecDeque<QueuedOp>,
    index: IndexTree,
}

struct Inner {
    store: DynBlockStore,
    names: DynNameService,
    shared: Mutex<Shared>,
    /// Serializes updates and refreshes. Tokio's mutex is fair, so writers
    /// run in arrival order.
    write_lane: AsyncMutex<()>,
    root_tx: watch::Sender<Option<ContentId>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("cache state poisoned")
    }

    fn announce_root(&self, root: Option<ContentId>) {
        self.root_tx.send_if_modified(|current| {
            if *current == root {
                return false;
            }
            *current = root;
            true
        });
    }
}

/// An index bound to one mutable name.
///
/// Construction spawns a loader that resolves the name and loads the root it
/// points at. Calls issued before loading completes are queued and run in
/// submission order once it does; later calls run immediately. Updates are
/// serialized and each one republishes the name.
///
/// Must be created inside a Tokio runtime. Dropping the cache aborts its
/// background tasks and discards calls left queued by callers that stopped
/// waiting for them.
pub struct Cache {
    inner: Arc<Inner>,
    loader: Mutex<Option<JoinHandle<()>>>,
    refresher: Option<JoinHandle<()>>,
}

impl Cache {
    /// Bind a new cache to `config.name`, or to the naming service's local
    /// name when none is configured.
    pub fn new(
        store: DynBlockStore,
        names: DynNameService,
        config: CacheConfig,
    ) -> CacheResult<Self> {
        let name = config.name.clone().unwrap_or_else(|| names.local_name());
        validate_name(&name)?;

        let (root_tx, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                phase: CacheState::Uninitialized,
                name,
                generation: 0,
                root: None,
                published: None,
                queue: VecDeque::new(),
                index: IndexTree::new(Arc::clone(&store)),
            }),
            store,
            names,
            write_lane: AsyncMutex::new(()),
            root_tx,
        });

        let loader = tokio::spawn(load(Arc::clone(&inner), 0));
        let refresher = config
            .refresh_interval()
            .map(|every| tokio::spawn(refresh_loop(Arc::clone(&inner), every)));

        Ok(Self {
            inner,
            loader: Mutex::new(Some(loader)),
            refresher,
        })
    }

    /// The name this cache is bound to.
    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn state(&self) -> CacheState {
        self.inner.lock().phase
    }

    /// Number of calls waiting for the cache to become ready.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Root of the current snapshot, if any.
    pub fn current_root(&self) -> Option<ContentId> {
        self.inner.lock().root
    }

    /// Look up `key`.
    ///
    /// A miss is `Ok(None)`. Values stored by handle are fetched from the
    /// block store before returning.
    pub async fn query(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let queued = {
            let mut shared = self.inner.lock();
            if shared.phase == CacheState::Ready {
                None
            } else {
                let (notify, rx) = oneshot::channel();
                shared.queue.push_back(QueuedOp::Query {
                    key: key.to_string(),
                    notify,
                });
                debug!(key, queued = shared.queue.len(), "query queued");
                Some(rx)
            }
        };
        match queued {
            None => query_now(&self.inner, key).await,
            Some(rx) => rx.await.unwrap_or(Err(CacheError::Cancelled)),
        }
    }

    /// Map `key` to `value`, then publish the new root under the bound name.
    ///
    /// Returns the new root. On [`CacheError::is_publish_failure`] the write
    /// is already visible to this cache's queries but not to other peers.
    pub async fn update(&self, key: &str, value: IndexValue) -> CacheResult<ContentId> {
        let (generation, queued) = {
            let mut shared = self.inner.lock();
            if shared.phase == CacheState::Ready {
                (shared.generation, None)
            } else {
                let (notify, rx) = oneshot::channel();
                shared.queue.push_back(QueuedOp::Update {
                    key: key.to_string(),
                    value: value.clone(),
                    notify,
                });
                debug!(key, queued = shared.queue.len(), "update queued");
                (shared.generation, Some(rx))
            }
        };
        match queued {
            None => update_now(&self.inner, generation, key, value).await,
            Some(rx) => rx.await.unwrap_or(Err(CacheError::Cancelled)),
        }
    }

    /// Store `content` as a block and map `key` to its handle.
    pub async fn insert_content(&self, key: &str, content: &[u8]) -> CacheResult<ContentId> {
        let handle = self.inner.store.store(content).await?;
        self.update(key, IndexValue::Handle(handle)).await?;
        Ok(handle)
    }

    /// Fetch the content `key` maps to. A miss is `Ok(None)`.
    pub async fn get_content(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.query(key).await
    }

    /// Every entry of the current snapshot, sorted by key.
    pub async fn entries(&self) -> CacheResult<Vec<(String, IndexValue)>> {
        let (root, index) = {
            let shared = self.inner.lock();
            (shared.root, shared.index.clone())
        };
        Ok(index.entries(root).await?)
    }

    /// Wait for the next change of the current root and return it.
    pub async fn wait_for_db_update(&self) -> CacheResult<Option<ContentId>> {
        let mut rx = self.inner.root_tx.subscribe();
        rx.changed().await.map_err(|_| CacheError::Cancelled)?;
        let root = *rx.borrow_and_update();
        Ok(root)
    }

    /// Re-resolve the bound name now and adopt its root if another peer
    /// published a new one. Returns `true` if the root changed.
    pub async fn refresh(&self) -> CacheResult<bool> {
        refresh_now(&self.inner).await
    }

    /// Bind to a different name.
    ///
    /// Returns to [`CacheState::Loading`] with a fresh index. Queued calls are
    /// discarded and their callers receive [`CacheError::Cancelled`].
    pub fn rebind(&self, name: impl Into<String>) -> CacheResult<()> {
        let name = name.into();
        validate_name(&name)?;

        let mut loader = self.loader.lock().expect("loader handle poisoned");
        if let Some(handle) = loader.take() {
            handle.abort();
        }

        let (generation, discarded) = {
            let mut shared = self.inner.lock();
            shared.generation += 1;
            shared.name = name.clone();
            shared.phase = CacheState::Loading;
            shared.root = None;
            shared.published = None;
            shared.index = IndexTree::new(Arc::clone(&self.inner.store));
            self.inner.announce_root(None);
            (shared.generation, std::mem::take(&mut shared.queue))
        };
        if !discarded.is_empty() {
            warn!(name = %name, discarded = discarded.len(), "rebind discarded queued operations");
        }
        drop(discarded);

        info!(name = %name, generation, "cache rebound");
        *loader = Some(tokio::spawn(load(Arc::clone(&self.inner), generation)));
        Ok(())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Ok(loader) = self.loader.get_mut() {
            if let Some(handle) = loader.take() {
                handle.abort();
            }
        }
        if let Some(handle) = self.refresher.take() {
            handle.abort();
        }
        // Every caller borrows the cache, so only ops whose caller gave up
        // waiting can still be queued here.
        if let Ok(mut shared) = self.inner.shared.lock() {
            let discarded = std::mem::take(&mut shared.queue);
            if !discarded.is_empty() {
                debug!(discarded = discarded.len(), "cache dropped with queued operations");
            }
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("Cache")
            .field("name", &shared.name)
            .field("state", &shared.phase)
            .field("root", &shared.root)
            .field("queued", &shared.queue.len())
            .finish()
    }
}

async fn load(inner: Arc<Inner>, generation: u64) {
    let (name, index) = {
        let mut shared = inner.lock();
        if shared.generation != generation {
            return;
        }
        shared.phase = CacheState::Loading;
        (shared.name.clone(), shared.index.clone())
    };

    // Writes still running under an older binding publish before the name
    // is resolved again.
    let lane = inner.write_lane.lock().await;
    debug!(name = %name, "resolving index root");
    let (resolved, root) = match inner.names.resolve(&name).await {
        Ok(Some(resolved)) => match index.validate_root(&resolved).await {
            Ok(()) => (Some(resolved), Some(resolved)),
            Err(e) => {
                warn!(name = %name, root = %resolved.short_hex(), error = %e, "published root unusable, starting empty");
                (Some(resolved), None)
            }
        },
        Ok(None) => {
            info!(name = %name, "nothing published yet, starting empty");
            (None, None)
        }
        Err(e) => {
            warn!(name = %name, error = %e, "resolve failed, starting empty");
            (None, None)
        }
    };

    {
        let mut shared = inner.lock();
        if shared.generation != generation {
            return;
        }
        shared.root = root;
        shared.published = resolved;
        inner.announce_root(root);
    }
    drop(lane);
    drain(&inner, generation).await;
}

/// Run queued calls one at a time, oldest first, then open the cache.
///
/// The phase only flips to `Ready` once the queue is observed empty under
/// the lock, so calls arriving mid-drain join the back of the queue.
async fn drain(inner: &Inner, generation: u64) {
    let mut drained = 0usize;
    loop {
        let op = {
            let mut shared = inner.lock();
            if shared.generation != generation {
                return;
            }
            match shared.queue.pop_front() {
                Some(op) => op,
                None => {
                    shared.phase = CacheState::Ready;
                    info!(
                        name = %shared.name,
                        root = ?shared.root,
                        drained,
                        "cache ready"
                    );
                    return;
                }
            }
        };
        debug!(kind = op.kind(), key = op.key(), "running queued op");
        run_queued(inner, generation, op).await;
        drained += 1;
    }
}

async fn run_queued(inner: &Inner, generation: u64, op: QueuedOp) {
    match op {
        QueuedOp::Query { key, notify } => {
            if notify.is_closed() {
                return;
            }
            let _ = notify.send(query_now(inner, &key).await);
        }
        QueuedOp::Update { key, value, notify } => {
            // Runs even if the caller went away: the write was accepted.
            let _ = notify.send(update_now(inner, generation, &key, value).await);
        }
    }
}

async fn query_now(inner: &Inner, key: &str) -> CacheResult<Option<Vec<u8>>> {
    let (root, index) = {
        let shared = inner.lock();
        (shared.root, shared.index.clone())
    };
    let value = match index.find(root, key).await {
        Ok(value) => value,
        Err(IndexError::NotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match value {
        IndexValue::Inline(bytes) => Ok(Some(bytes)),
        IndexValue::Handle(id) => {
            let content = inner
                .store
                .fetch(&id)
                .await
                .map_err(|e| IndexError::BlockUnavailable {
                    id,
                    reason: e.to_string(),
                })?
                .ok_or_else(|| IndexError::BlockUnavailable {
                    id,
                    reason: "content not found".into(),
                })?;
            Ok(Some(content))
        }
    }
}

/// Apply one write accepted under `generation`. A rebind since then cancels
/// it, even when it is still waiting for the write lane.
async fn update_now(
    inner: &Inner,
    generation: u64,
    key: &str,
    value: IndexValue,
) -> CacheResult<ContentId> {
    let _lane = inner.write_lane.lock().await;
    let (name, root, index) = {
        let shared = inner.lock();
        if shared.generation != generation {
            debug!(key, "binding changed while waiting, update cancelled");
            return Err(CacheError::Cancelled);
        }
        (shared.name.clone(), shared.root, shared.index.clone())
    };

    let new_root = index.insert(root, key, value).await?;

    let already_published = {
        let mut shared = inner.lock();
        if shared.generation != generation {
            return Err(CacheError::Cancelled);
        }
        shared.root = Some(new_root);
        inner.announce_root(Some(new_root));
        shared.published == Some(new_root)
    };
    if already_published {
        debug!(key, root = %new_root.short_hex(), "root unchanged, skipping publish");
        return Ok(new_root);
    }

    if let Err(e) = inner.names.publish(&name, new_root).await {
        warn!(name = %name, root = %new_root.short_hex(), error = %e, "publish failed, local root is ahead");
        return Err(e.into());
    }
    {
        let mut shared = inner.lock();
        if shared.generation == generation {
            shared.published = Some(new_root);
        }
    }
    info!(name = %name, key, root = %new_root.short_hex(), "index published");
    Ok(new_root)
}

async fn refresh_now(inner: &Inner) -> CacheResult<bool> {
    let _lane = inner.write_lane.lock().await;
    let (phase, generation, name, published, index) = {
        let shared = inner.lock();
        (
            shared.phase,
            shared.generation,
            shared.name.clone(),
            shared.published,
            shared.index.clone(),
        )
    };
    if phase != CacheState::Ready {
        return Ok(false);
    }

    let Some(resolved) = inner.names.resolve(&name).await? else {
        return Ok(false);
    };
    if published == Some(resolved) {
        return Ok(false);
    }
    index.validate_root(&resolved).await?;

    {
        let mut shared = inner.lock();
        if shared.generation != generation {
            return Ok(false);
        }
        shared.root = Some(resolved);
        shared.published = Some(resolved);
        inner.announce_root(Some(resolved));
    }
    info!(name = %name, root = %resolved.short_hex(), "adopted remote root");
    Ok(true)
}

async fn refresh_loop(inner: Arc<Inner>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the loader covers that moment.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = refresh_now(&inner).await {
            debug!(error = %e, "background refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pcache_names::{InMemoryNameService, NameError, NameService};
    use pcache_store::{BlockStore, InMemoryBlockStore};
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    use super::*;

    const OPEN: usize = 1 << 20;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    /// Name service whose resolve and publish calls wait on gates. Each call
    /// consumes one permit.
    struct GatedNames {
        inner: InMemoryNameService,
        resolve_gate: Semaphore,
        publish_gate: Semaphore,
        publishes_started: AtomicUsize,
    }

    impl GatedNames {
        fn new(inner: InMemoryNameService, resolve_open: bool, publish_open: bool) -> Self {
            Self {
                inner,
                resolve_gate: Semaphore::new(if resolve_open { OPEN } else { 0 }),
                publish_gate: Semaphore::new(if publish_open { OPEN } else { 0 }),
                publishes_started: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NameService for GatedNames {
        async fn resolve(&self, name: &str) -> pcache_names::Result<Option<ContentId>> {
            self.resolve_gate
                .acquire()
                .await
                .map_err(|e| NameError::ResolveFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?
                .forget();
            self.inner.resolve(name).await
        }

        async fn publish(&self, name: &str, target: ContentId) -> pcache_names::Result<()> {
            self.publishes_started.fetch_add(1, Ordering::SeqCst);
            self.publish_gate
                .acquire()
                .await
                .map_err(|e| NameError::PublishFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?
                .forget();
            self.inner.publish(name, target).await
        }

        fn local_name(&self) -> String {
            self.inner.local_name()
        }
    }

    struct Fixture {
        store: Arc<InMemoryBlockStore>,
        names: Arc<InMemoryNameService>,
    }

    impl Fixture {
        fn new() -> Self {
            init_tracing();
            Self {
                store: Arc::new(InMemoryBlockStore::new()),
                names: Arc::new(InMemoryNameService::new("self")),
            }
        }

        fn cache(&self, config: CacheConfig) -> Cache {
            Cache::new(self.store.clone(), self.names.clone(), config).unwrap()
        }
    }

    async fn wait_ready(cache: &Cache) {
        timeout(Duration::from_secs(5), async {
            while cache.state() != CacheState::Ready {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("cache never became ready");
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn end_to_end_on_unpublished_name() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        assert_eq!(cache.name(), "self");

        assert_eq!(cache.query("key").await.unwrap(), None);
        let root = cache.update("key", "value".into()).await.unwrap();
        assert_eq!(cache.query("key").await.unwrap(), Some(b"value".to_vec()));

        assert_eq!(cache.current_root(), Some(root));
        assert_eq!(fx.names.resolve("self").await.unwrap(), Some(root));
        assert_eq!(cache.state(), CacheState::Ready);
    }

    #[tokio::test]
    async fn calls_before_ready_are_queued_and_run_in_order() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(InMemoryNameService::new("self"), false, true));
        let cache = Cache::new(fx.store.clone(), gated.clone(), CacheConfig::default()).unwrap();

        let open = async {
            wait_until(|| cache.queued() == 4).await;
            assert_ne!(cache.state(), CacheState::Ready);
            gated.resolve_gate.add_permits(OPEN);
        };
        let (r1, r2, q1, q_missing, ()) = tokio::join!(
            cache.update("k1", "v1".into()),
            cache.update("k2", "v2".into()),
            cache.query("k1"),
            cache.query("missing"),
            open,
        );
        let r1 = r1.unwrap();
        let r2 = r2.unwrap();
        assert_ne!(r1, r2);
        // The query was queued after the first update and sees it.
        assert_eq!(q1.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(q_missing.unwrap(), None);

        // No lost update: the final root holds both keys.
        assert_eq!(cache.current_root(), Some(r2));
        let index = IndexTree::new(fx.store.clone());
        let keys: Vec<String> = index
            .entries(Some(r2))
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(cache.queued(), 0);
        assert_eq!(cache.state(), CacheState::Ready);
    }

    #[tokio::test]
    async fn queued_updates_to_one_key_apply_in_submission_order() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(InMemoryNameService::new("self"), false, true));
        let cache = Cache::new(fx.store.clone(), gated.clone(), CacheConfig::default()).unwrap();

        let open = async {
            wait_until(|| cache.queued() == 2).await;
            gated.resolve_gate.add_permits(OPEN);
        };
        let (a, b, ()) = tokio::join!(
            cache.update("key", "first".into()),
            cache.update("key", "second".into()),
            open,
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(cache.query("key").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn concurrent_live_updates_do_not_lose_writes() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        wait_ready(&cache).await;

        let (a, b, c) = tokio::join!(
            cache.update("a", "1".into()),
            cache.update("b", "2".into()),
            cache.update("c", "3".into()),
        );
        a.unwrap();
        b.unwrap();
        let last = c.unwrap();
        assert_eq!(cache.current_root(), Some(last));
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            assert_eq!(cache.query(k).await.unwrap(), Some(v.as_bytes().to_vec()));
        }
        assert_eq!(fx.names.publish_count(), 3);
    }

    #[tokio::test]
    async fn updates_serialize_behind_in_flight_publish_while_queries_proceed() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(InMemoryNameService::new("self"), true, false));
        let cache = Arc::new(
            Cache::new(fx.store.clone(), gated.clone(), CacheConfig::default()).unwrap(),
        );
        wait_ready(&cache).await;

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.update("a", "1".into()).await }
        });
        wait_until(|| gated.publishes_started.load(Ordering::SeqCst) == 1).await;

        // The root was swapped before publishing; readers see the write.
        assert_eq!(cache.query("a").await.unwrap(), Some(b"1".to_vec()));

        let second = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.update("b", "2".into()).await }
        });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // Still waiting for the write lane: its insert has not started.
        assert!(!second.is_finished());
        assert_eq!(gated.publishes_started.load(Ordering::SeqCst), 1);
        assert_eq!(cache.query("b").await.unwrap(), None);

        gated.publish_gate.add_permits(OPEN);
        first.await.unwrap().unwrap();
        let root = second.await.unwrap().unwrap();
        assert_eq!(gated.inner.resolve("self").await.unwrap(), Some(root));
        assert_eq!(cache.query("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(cache.query("b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn repeated_update_publishes_once() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        let r1 = cache.update("key", "value".into()).await.unwrap();
        let stores = fx.store.stats().stores;
        let r2 = cache.update("key", "value".into()).await.unwrap();
        assert_eq!(r1, r2);
        assert_eq!(fx.store.stats().stores, stores);
        assert_eq!(fx.names.publish_count(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_reported_but_root_advances() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        wait_ready(&cache).await;
        fx.names.set_reject_publish(true);

        let err = cache.update("key", "value".into()).await.unwrap_err();
        assert!(err.is_publish_failure());
        assert!(cache.current_root().is_some());
        assert_eq!(cache.query("key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(fx.names.resolve("self").await.unwrap(), None);

        // Retrying the same write publishes the root that is already local.
        fx.names.set_reject_publish(false);
        let root = cache.update("key", "value".into()).await.unwrap();
        assert_eq!(fx.names.resolve("self").await.unwrap(), Some(root));
        assert_eq!(fx.names.publish_count(), 1);
    }

    #[tokio::test]
    async fn resolve_failure_bootstraps_empty_index() {
        let fx = Fixture::new();
        fx.names.set_offline(true);
        let cache = fx.cache(CacheConfig::default());
        assert_eq!(cache.query("key").await.unwrap(), None);
        assert_eq!(cache.state(), CacheState::Ready);
        assert_eq!(cache.current_root(), None);
    }

    #[tokio::test]
    async fn corrupt_published_root_bootstraps_empty_index() {
        let fx = Fixture::new();
        let garbage = fx.store.store(b"{\"url\": \"not a node\"}").await.unwrap();
        fx.names.registry().set("self", garbage);

        let cache = fx.cache(CacheConfig::default());
        assert_eq!(cache.query("url").await.unwrap(), None);
        assert_eq!(cache.current_root(), None);

        let root = cache.update("url", "fresh".into()).await.unwrap();
        assert_eq!(fx.names.resolve("self").await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn missing_published_root_bootstraps_empty_index() {
        let fx = Fixture::new();
        fx.names.registry().set("self", ContentId::of(b"never stored"));
        let cache = fx.cache(CacheConfig::default());
        assert_eq!(cache.query("key").await.unwrap(), None);
        assert_eq!(cache.current_root(), None);
    }

    #[tokio::test]
    async fn existing_root_is_loaded_by_another_peer() {
        let fx = Fixture::new();
        let writer = fx.cache(CacheConfig::default());
        let root = writer.update("https://example.com/", "page".into()).await.unwrap();

        let reader_names = Arc::new(fx.names.peer("reader"));
        let reader = Cache::new(
            fx.store.clone(),
            reader_names,
            CacheConfig::default().with_name("self"),
        )
        .unwrap();
        assert_eq!(
            reader.query("https://example.com/").await.unwrap(),
            Some(b"page".to_vec())
        );
        assert_eq!(reader.current_root(), Some(root));
    }

    #[tokio::test]
    async fn unreachable_store_is_an_error_not_a_miss() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        cache.update("key", "value".into()).await.unwrap();
        fx.store.set_offline(true);
        assert!(matches!(
            cache.query("key").await,
            Err(CacheError::Index(IndexError::BlockUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn insert_and_get_content_by_handle() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        let handle = cache.insert_content("url", b"<html>body</html>").await.unwrap();
        assert!(fx.store.contains(&handle).await.unwrap());
        assert_eq!(
            cache.get_content("url").await.unwrap(),
            Some(b"<html>body</html>".to_vec())
        );
        assert_eq!(cache.get_content("other").await.unwrap(), None);

        fx.store.remove(&handle);
        assert!(matches!(
            cache.get_content("url").await,
            Err(CacheError::Index(IndexError::BlockUnavailable { id, .. })) if id == handle
        ));
    }

    #[tokio::test]
    async fn rebind_cancels_queued_calls_and_reloads() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(fx.names.peer("self"), false, true));
        let cache = Arc::new(
            Cache::new(fx.store.clone(), gated.clone(), CacheConfig::default()).unwrap(),
        );

        let pending = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.query("key").await }
        });
        wait_until(|| cache.queued() == 1).await;

        cache.rebind("other").unwrap();
        assert!(matches!(pending.await.unwrap(), Err(CacheError::Cancelled)));
        assert_eq!(cache.queued(), 0);
        assert_eq!(cache.state(), CacheState::Loading);
        assert_eq!(cache.name(), "other");

        gated.resolve_gate.add_permits(OPEN);
        wait_ready(&cache).await;
        assert_eq!(cache.query("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rebind_cancels_update_waiting_for_write_lane() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(fx.names.peer("self"), false, false));
        let cache = Arc::new(
            Cache::new(fx.store.clone(), gated.clone(), CacheConfig::default()).unwrap(),
        );
        gated.resolve_gate.add_permits(1);
        wait_ready(&cache).await;
        gated.publish_gate.add_permits(1);
        cache.update("a", "1".into()).await.unwrap();

        // `b` holds the write lane while its publish is held; `c` waits behind it.
        let b = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.update("b", "2".into()).await }
        });
        wait_until(|| gated.publishes_started.load(Ordering::SeqCst) == 2).await;
        let c = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.update("c", "3".into()).await }
        });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(!c.is_finished());

        cache.rebind("self").unwrap();
        gated.publish_gate.add_permits(OPEN);
        let ab = b.await.unwrap().unwrap();
        assert!(matches!(c.await.unwrap(), Err(CacheError::Cancelled)));
        assert_eq!(gated.publishes_started.load(Ordering::SeqCst), 2);

        gated.resolve_gate.add_permits(OPEN);
        wait_ready(&cache).await;
        assert_eq!(fx.names.resolve("self").await.unwrap(), Some(ab));
        assert_eq!(cache.current_root(), Some(ab));
        assert_eq!(*cache.inner.root_tx.borrow(), Some(ab));
        let keys: Vec<String> = cache
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rebind_rejects_invalid_names() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        assert!(matches!(cache.rebind("bad name"), Err(CacheError::Name(_))));
        assert_eq!(cache.name(), "self");
    }

    #[tokio::test]
    async fn invalid_configured_name_is_rejected() {
        let fx = Fixture::new();
        let result = Cache::new(
            fx.store.clone(),
            fx.names.clone(),
            CacheConfig::default().with_name(""),
        );
        assert!(matches!(result, Err(CacheError::Name(_))));
    }

    #[tokio::test]
    async fn dropping_cache_stops_background_tasks() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(InMemoryNameService::new("self"), false, true));
        let cache = Cache::new(
            fx.store.clone(),
            gated,
            CacheConfig::default().with_refresh_interval(Duration::from_millis(5)),
        )
        .unwrap();
        tokio::task::yield_now().await;
        assert!(Arc::strong_count(&fx.store) > 1);

        drop(cache);
        // Aborted tasks release their handle on the shared state.
        wait_until(|| Arc::strong_count(&fx.store) == 1).await;
    }

    #[tokio::test]
    async fn abandoned_queued_calls_are_discarded_on_drop() {
        let fx = Fixture::new();
        let gated = Arc::new(GatedNames::new(InMemoryNameService::new("self"), false, true));
        let cache = Cache::new(fx.store.clone(), gated, CacheConfig::default()).unwrap();

        let gave_up = timeout(Duration::from_millis(10), cache.query("key")).await;
        assert!(gave_up.is_err());
        assert_eq!(cache.queued(), 1);

        drop(cache);
        wait_until(|| Arc::strong_count(&fx.store) == 1).await;
    }

    #[tokio::test]
    async fn corrupt_node_below_valid_root_is_an_error_not_a_miss() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        let root = cache.update("key", "value".into()).await.unwrap();

        let index = IndexTree::new(fx.store.clone());
        let leaf = *index.trace(Some(root), "key").await.unwrap().last().unwrap();
        assert_ne!(leaf, root);
        fx.store.insert_raw(leaf, b"PCN\x01\x07".to_vec());

        assert!(matches!(
            cache.query("key").await,
            Err(CacheError::Index(IndexError::Corrupt { id, .. })) if id == leaf
        ));
        assert!(index.validate_root(&root).await.is_ok());
    }

    #[tokio::test]
    async fn entries_follow_current_snapshot() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        assert!(cache.entries().await.unwrap().is_empty());
        cache.update("b", "2".into()).await.unwrap();
        cache.update("a", "1".into()).await.unwrap();
        assert_eq!(
            cache.entries().await.unwrap(),
            vec![
                ("a".to_string(), IndexValue::from("1")),
                ("b".to_string(), IndexValue::from("2")),
            ]
        );
    }

    #[tokio::test]
    async fn wait_for_db_update_sees_local_writes() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        wait_ready(&cache).await;

        let (seen, written) = tokio::join!(
            cache.wait_for_db_update(),
            cache.update("key", "value".into())
        );
        assert_eq!(seen.unwrap(), Some(written.unwrap()));
    }

    #[tokio::test]
    async fn background_refresh_follows_remote_publisher() {
        let fx = Fixture::new();
        let writer = fx.cache(CacheConfig::default());
        wait_ready(&writer).await;

        let reader = Cache::new(
            fx.store.clone(),
            Arc::new(fx.names.peer("reader")),
            CacheConfig::default()
                .with_name("self")
                .with_refresh_interval(Duration::from_millis(10)),
        )
        .unwrap();
        wait_ready(&reader).await;
        assert_eq!(reader.query("key").await.unwrap(), None);

        let (seen, written) = tokio::join!(
            timeout(Duration::from_secs(5), reader.wait_for_db_update()),
            writer.update("key", "value".into())
        );
        let written = written.unwrap();
        assert_eq!(seen.expect("no refresh observed").unwrap(), Some(written));
        assert_eq!(reader.query("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn manual_refresh_adopts_only_external_changes() {
        let fx = Fixture::new();
        let writer = fx.cache(CacheConfig::default());
        let reader = Cache::new(
            fx.store.clone(),
            Arc::new(fx.names.peer("reader")),
            CacheConfig::default().with_name("self"),
        )
        .unwrap();
        wait_ready(&reader).await;
        assert!(!reader.refresh().await.unwrap());

        let root = writer.update("key", "value".into()).await.unwrap();
        assert!(reader.refresh().await.unwrap());
        assert_eq!(reader.current_root(), Some(root));
        assert!(!reader.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn refresh_does_not_revert_unpublished_local_write() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        let published = cache.update("a", "1".into()).await.unwrap();

        fx.names.set_reject_publish(true);
        let local = cache.update("b", "2".into()).await.unwrap_err();
        assert!(local.is_publish_failure());
        let ahead = cache.current_root().unwrap();
        assert_ne!(ahead, published);

        // The name still points at `published`, which this cache published.
        assert!(!cache.refresh().await.unwrap());
        assert_eq!(cache.current_root(), Some(ahead));
    }

    #[tokio::test]
    async fn debug_format() {
        let fx = Fixture::new();
        let cache = fx.cache(CacheConfig::default());
        let debug = format!("{cache:?}");
        assert!(debug.contains("Cache"));
        assert!(debug.contains("self"));
    }
}
