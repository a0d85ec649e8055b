use std::fmt;

use pcache_index::IndexValue;
use pcache_types::ContentId;
use tokio::sync::oneshot;

use crate::error::CacheResult;

/// Lifecycle phase of a [`Cache`](crate::Cache).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheState {
    /// Constructed; the loader has not started yet.
    Uninitialized,
    /// Resolving the name, validating the root, or draining queued calls.
    Loading,
    /// Serving calls directly against the current root.
    Ready,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// A call deferred until the cache is ready.
///
/// Dropping an op without running it drops its notifier, which resolves the
/// waiting caller with [`CacheError::Cancelled`](crate::CacheError::Cancelled).
pub(crate) enum QueuedOp {
    Query {
        key: String,
        notify: oneshot::Sender<CacheResult<Option<Vec<u8>>>>,
    },
    Update {
        key: String,
        value: IndexValue,
        notify: oneshot::Sender<CacheResult<ContentId>>,
    },
}

impl QueuedOp {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Update { .. } => "update",
        }
    }

    pub(crate) fn key(&self) -> &str {
        match self {
            Self::Query { key, .. } | Self::Update { key, .. } => key,
        }
    }
}
