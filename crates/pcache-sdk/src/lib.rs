//! High-level SDK for peercache.
//!
//! An [`Injector`] inserts content and publishes the resulting index under
//! its own name. A [`Client`] follows an injector's name and reads through
//! the latest snapshot it has seen. Both sit on a [`Cache`].

pub mod client;
pub mod error;
pub mod status;

pub use client::{Client, Injector};
pub use error::{SdkError, SdkResult};
pub use status::CacheStatus;

// Re-export key types
pub use pcache_cache::{Cache, CacheConfig, CacheError, CacheState};
pub use pcache_index::IndexValue;
pub use pcache_names::{DynNameService, InMemoryNameService, NameService};
pub use pcache_store::{BlockStore, DynBlockStore, InMemoryBlockStore};
pub use pcache_types::ContentId;
