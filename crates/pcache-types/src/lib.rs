//! Foundation types for peercache.
//!
//! Every other peercache crate depends on `pcache-types` for the
//! [`ContentId`] that names blocks in the content-addressed store and
//! snapshots of the index.

pub mod error;
pub mod id;

pub use error::TypeError;
pub use id::ContentId;
