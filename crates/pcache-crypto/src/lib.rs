//! Hashing primitives for peercache.
//!
//! Provides domain-separated BLAKE3 hashing for stored blocks and the
//! canonical derivation of a tree traversal path from an index key.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;
pub mod path;

pub use hasher::ContentHasher;
pub use path::{KeyPath, FAN_OUT, MAX_DEPTH};
