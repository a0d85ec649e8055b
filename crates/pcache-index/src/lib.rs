//! Persistent content-addressed index for peercache.
//!
//! The index maps application keys (typically URLs) to values, and every
//! version of the mapping is identified by the [`ContentId`] of its root
//! node. Nodes are immutable blocks in a [`BlockStore`]; an insert stores
//! only the nodes on the inserted key's path and shares every other subtree
//! with the previous version.
//!
//! # Layout
//!
//! - Keys are hashed into a 64-nibble [`KeyPath`]; each nibble selects one of
//!   16 slots per level.
//! - The root is always a branch. A slot points at a leaf when exactly one
//!   key has that prefix and at a sub-branch otherwise.
//! - The shape depends only on the key set, so equal key/value sets always
//!   produce equal roots.
//!
//! [`ContentId`]: pcache_types::ContentId
//! [`BlockStore`]: pcache_store::BlockStore
//! [`KeyPath`]: pcache_crypto::KeyPath

pub mod error;
pub mod node;
pub mod tree;

pub use error::{IndexError, IndexResult};
pub use node::{Branch, Edge, IndexValue, Leaf, Node, FORMAT_VERSION};
pub use tree::IndexTree;
