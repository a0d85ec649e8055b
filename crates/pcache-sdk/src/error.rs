use thiserror::Error;

use pcache_cache::CacheError;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type SdkResult<T> = Result<T, SdkError>;
