//! Cache lifecycle for peercache.
//!
//! A [`Cache`] binds an [`IndexTree`](pcache_index::IndexTree) to one mutable
//! name. It loads the root the name points at, defers calls that arrive
//! before loading finishes, serializes updates, and republishes the name
//! after every write.
//!
//! ```text
//! Uninitialized ──spawn loader──▶ Loading ──queue drained──▶ Ready
//!        ▲                           ▲                         │
//!        └──────────── rebind ───────┴─────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: The [`Cache`] state machine
//! - [`config`]: [`CacheConfig`], loadable from TOML
//! - [`error`]: [`CacheError`] and [`CacheResult`]
//! - [`state`]: [`CacheState`]

pub mod cache;
pub mod config;
pub mod error;
pub mod state;

pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use state::CacheState;
