//! Key → traversal path derivation.
//!
//! The path of a key is the sequence of nibbles of
//! `BLAKE3("pcache-path-v1:" ‖ key)`, high nibble first. Each nibble selects
//! one of [`FAN_OUT`] child slots at one tree level. This scheme is part of
//! the canonical index layout: changing it changes every published root.

use crate::hasher::ContentHasher;

/// Number of child slots per branch.
pub const FAN_OUT: usize = 16;

/// Maximum tree depth: one level per nibble of a 32-byte digest.
pub const MAX_DEPTH: usize = 64;

/// The traversal path of an index key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPath {
    digest: [u8; 32],
}

impl KeyPath {
    /// Derive the path of `key`.
    pub fn of(key: &str) -> Self {
        Self {
            digest: ContentHasher::PATH.digest(key.as_bytes()),
        }
    }

    /// Slot selected at `depth`, or `None` once the path is exhausted.
    pub fn slot(&self, depth: usize) -> Option<u8> {
        if depth >= MAX_DEPTH {
            return None;
        }
        let byte = self.digest[depth / 2];
        Some(if depth % 2 == 0 { byte >> 4 } else { byte & 0x0f })
    }

    /// Iterate over every slot of the path, root level first.
    pub fn slots(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_DEPTH).filter_map(move |d| self.slot(d))
    }

    /// The underlying digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl std::fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self
            .slots()
            .take(8)
            .map(|s| char::from_digit(u32::from(s), 16).unwrap_or('?'))
            .collect();
        write!(f, "KeyPath({prefix}..)")
    }
}
