//! Content-addressed block storage for peercache.
//!
//! The index never talks to a storage daemon directly. It consumes the
//! [`BlockStore`] capability: fetch a block by its [`ContentId`], or store
//! bytes and receive their identifier. Production deployments implement the
//! trait over their transport (e.g. an HTTP client to an IPFS node); this
//! crate ships [`InMemoryBlockStore`] for tests and embedding.
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content addressing guarantees this).
//! 2. Storing byte-identical content twice yields the same identifier.
//! 3. The store never interprets block contents.
//! 4. "Absent" (`Ok(None)`) and "unreachable" (`Err`) are distinct outcomes.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBlockStore, StoreStats};
pub use traits::{BlockStore, DynBlockStore};
