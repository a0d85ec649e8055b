//! The persistent index tree.
//!
//! [`IndexTree`] holds nothing but the block store capability. Every
//! operation takes the root to work against, so one tree value serves any
//! number of concurrent readers of different snapshots.

use pcache_crypto::KeyPath;
use pcache_store::DynBlockStore;
use pcache_types::ContentId;
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::node::{Branch, IndexValue, Leaf, Node};

/// Copy-on-write key → value tree over a content-addressed block store.
#[derive(Clone)]
pub struct IndexTree {
    store: DynBlockStore,
}

impl std::fmt::Debug for IndexTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTree").finish_non_exhaustive()
    }
}

impl IndexTree {
    /// Create a tree over the given block store.
    pub fn new(store: DynBlockStore) -> Self {
        Self { store }
    }

    /// The underlying block store.
    pub fn store(&self) -> &DynBlockStore {
        &self.store
    }

    /// Look up `key` in the snapshot `root`.
    ///
    /// Returns [`IndexError::NotFound`] when the key was never inserted
    /// under `root` (including when there is no root at all), and
    /// [`IndexError::BlockUnavailable`] when a node on the path cannot be
    /// fetched.
    pub async fn find(&self, root: Option<ContentId>, key: &str) -> IndexResult<IndexValue> {
        let Some(root) = root else {
            return Err(IndexError::NotFound);
        };
        let path = KeyPath::of(key);
        let mut branch = self.fetch_branch(&root).await?;
        let mut depth = 0;
        loop {
            let slot = path.slot(depth).ok_or_else(|| exhausted(key))?;
            let child = branch.child(slot).ok_or(IndexError::NotFound)?;
            match self.fetch_node(&child).await? {
                Node::Branch(next) => {
                    branch = next;
                    depth += 1;
                }
                Node::Leaf(leaf) if leaf.key == key => return Ok(leaf.value),
                Node::Leaf(_) => return Err(IndexError::NotFound),
            }
        }
    }

    /// Insert `key → value` into the snapshot `root`, returning the new root.
    ///
    /// Only the nodes on `key`'s path are rebuilt and stored; sibling edges
    /// are copied by identifier. Inserting a pair that is already present
    /// returns `root` unchanged without storing anything.
    pub async fn insert(
        &self,
        root: Option<ContentId>,
        key: &str,
        value: IndexValue,
    ) -> IndexResult<ContentId> {
        let path = KeyPath::of(key);
        let mut current = match root {
            Some(id) => self.fetch_branch(&id).await?,
            None => Branch::empty(),
        };

        // Branches from the root down, each paired with the slot whose edge
        // must be replaced once the level below has been stored.
        let mut spine: Vec<(Branch, u8)> = Vec::new();
        let mut depth = 0;
        loop {
            let slot = path.slot(depth).ok_or_else(|| exhausted(key))?;
            let Some(child) = current.child(slot) else {
                spine.push((current, slot));
                break;
            };
            match self.fetch_node(&child).await? {
                Node::Branch(next) => {
                    spine.push((current, slot));
                    current = next;
                    depth += 1;
                }
                Node::Leaf(existing) if existing.key == key => {
                    if existing.value == value {
                        if let Some(root) = root {
                            debug!(key, root = %root.short_hex(), "insert unchanged");
                            return Ok(root);
                        }
                    }
                    spine.push((current, slot));
                    break;
                }
                Node::Leaf(existing) => {
                    // Push both keys down until their paths diverge.
                    spine.push((current, slot));
                    let other = KeyPath::of(&existing.key);
                    loop {
                        depth += 1;
                        let ours = path.slot(depth).ok_or_else(|| exhausted(key))?;
                        let theirs = other.slot(depth).ok_or_else(|| exhausted(key))?;
                        if ours != theirs {
                            spine.push((Branch::empty().with(theirs, child), ours));
                            break;
                        }
                        spine.push((Branch::empty(), ours));
                    }
                    break;
                }
            }
        }

        let leaf = Node::Leaf(Leaf {
            key: key.to_string(),
            value,
        });
        let mut id = self.put(&leaf).await?;
        let mut stored = 1;
        while let Some((branch, slot)) = spine.pop() {
            id = self.put(&Node::Branch(branch.with(slot, id))).await?;
            stored += 1;
        }

        debug!(key, stored, root = %id.short_hex(), "insert complete");
        Ok(id)
    }

    /// Check that `root` names a decodable branch.
    pub async fn validate_root(&self, root: &ContentId) -> IndexResult<()> {
        self.fetch_branch(root).await.map(|_| ())
    }

    /// Every entry of the snapshot, sorted by key.
    ///
    /// Walks the whole tree; intended for inspection and tests rather than
    /// the request path.
    pub async fn entries(&self, root: Option<ContentId>) -> IndexResult<Vec<(String, IndexValue)>> {
        let Some(root) = root else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut pending = vec![root];
        let mut is_root = true;
        while let Some(id) = pending.pop() {
            let node = if is_root {
                is_root = false;
                Node::Branch(self.fetch_branch(&id).await?)
            } else {
                self.fetch_node(&id).await?
            };
            match node {
                Node::Branch(branch) => pending.extend(branch.edges().iter().map(|e| e.child)),
                Node::Leaf(leaf) => out.push((leaf.key, leaf.value)),
            }
        }
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(out)
    }

    /// Identifiers of the nodes visited while looking up `key`, root first.
    ///
    /// The walk ends at the leaf holding `key`, at a leaf holding another
    /// key, or at the last branch when the slot is empty.
    pub async fn trace(&self, root: Option<ContentId>, key: &str) -> IndexResult<Vec<ContentId>> {
        let Some(root) = root else {
            return Ok(Vec::new());
        };
        let path = KeyPath::of(key);
        let mut visited = vec![root];
        let mut branch = self.fetch_branch(&root).await?;
        let mut depth = 0;
        loop {
            let slot = path.slot(depth).ok_or_else(|| exhausted(key))?;
            let Some(child) = branch.child(slot) else {
                return Ok(visited);
            };
            visited.push(child);
            match self.fetch_node(&child).await? {
                Node::Branch(next) => {
                    branch = next;
                    depth += 1;
                }
                Node::Leaf(_) => return Ok(visited),
            }
        }
    }

    async fn fetch_node(&self, id: &ContentId) -> IndexResult<Node> {
        let data = self
            .store
            .fetch(id)
            .await
            .map_err(|e| IndexError::BlockUnavailable {
                id: *id,
                reason: e.to_string(),
            })?
            .ok_or_else(|| IndexError::BlockUnavailable {
                id: *id,
                reason: "block not found".into(),
            })?;
        Node::decode(id, &data)
    }

    async fn fetch_branch(&self, id: &ContentId) -> IndexResult<Branch> {
        match self.fetch_node(id).await? {
            Node::Branch(branch) => Ok(branch),
            Node::Leaf(_) => Err(IndexError::Corrupt {
                id: *id,
                reason: "root is not a branch".into(),
            }),
        }
    }

    async fn put(&self, node: &Node) -> IndexResult<ContentId> {
        Ok(self.store.store(&node.encode()).await?)
    }
}

fn exhausted(key: &str) -> IndexError {
    IndexError::PathExhausted {
        key: key.to_string(),
    }
}
