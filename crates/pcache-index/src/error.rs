use pcache_store::StoreError;
use pcache_types::ContentId;

/// Errors from index tree operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The key was never inserted under this root.
    #[error("key not found")]
    NotFound,

    /// A referenced node or value could not be fetched. Unlike
    /// [`IndexError::NotFound`] this says nothing about whether the key
    /// exists.
    #[error("block {id} unavailable: {reason}")]
    BlockUnavailable { id: ContentId, reason: String },

    /// Fetched bytes failed structural decoding.
    #[error("corrupt node {id}: {reason}")]
    Corrupt { id: ContentId, reason: String },

    /// Storing a new node failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Two distinct keys share a full 256-bit path digest.
    #[error("key path exhausted for {key:?}")]
    PathExhausted { key: String },
}

impl IndexError {
    /// Returns `true` for a definitive miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
