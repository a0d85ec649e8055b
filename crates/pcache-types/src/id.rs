use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of a [`ContentId`].
pub const CONTENT_ID_LEN: usize = 32;

/// Content address of a stored block.
///
/// A `ContentId` is the BLAKE3 hash of a block's bytes. Storing identical
/// bytes twice always yields the same `ContentId`, so peers can compare index
/// snapshots by comparing their root identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId([u8; CONTENT_ID_LEN]);

impl ContentId {
    /// Compute the `ContentId` of raw bytes (no domain separation).
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; CONTENT_ID_LEN]) -> Self {
        Self(hash)
    }

    /// Build from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; CONTENT_ID_LEN] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: CONTENT_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short_hex())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; CONTENT_ID_LEN]> for ContentId {
    fn from(bytes: [u8; CONTENT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ContentId> for [u8; CONTENT_ID_LEN] {
    fn from(id: ContentId) -> Self {
        id.0
    }
}
