use thiserror::Error;

use pcache_index::IndexError;
use pcache_names::NameError;
use pcache_store::StoreError;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Fault on the read or write path of the index.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Storing content failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Name validation, resolution or publication failed.
    ///
    /// A `PublishFailed` after an update means the in-memory root already
    /// holds the write but the name still points at the previous root.
    #[error("name error: {0}")]
    Name(#[from] NameError),

    /// The operation was discarded before it ran, by a rebind or teardown.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns `true` if the local write succeeded but publication did not.
    pub fn is_publish_failure(&self) -> bool {
        matches!(self, Self::Name(NameError::PublishFailed { .. }))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
