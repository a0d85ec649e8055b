//! Index nodes and their canonical byte encoding.
//!
//! Encoding, version 1 (all integers little-endian):
//!
//! ```text
//! node   := "PCN" version:u8 tag:u8 body
//! leaf   := key_len:u32 key:utf8 value                  (tag 0)
//! value  := 0x00 len:u32 bytes                          (inline)
//!         | 0x01 id:[u8; 32]                            (handle)
//! branch := count:u8 (slot:u8 id:[u8; 32]) * count      (tag 1)
//! ```
//!
//! Branch slots are strictly ascending, below 16, and a branch holds at
//! least one edge. Decoding rejects anything else, so every logical node has
//! exactly one byte representation and therefore one identifier.

use pcache_crypto::FAN_OUT;
use pcache_types::ContentId;

use crate::error::{IndexError, IndexResult};

/// Leading bytes of every encoded node.
pub const MAGIC: &[u8; 3] = b"PCN";

/// Version of the node encoding.
pub const FORMAT_VERSION: u8 = 1;

const TAG_LEAF: u8 = 0;
const TAG_BRANCH: u8 = 1;
const VALUE_INLINE: u8 = 0;
const VALUE_HANDLE: u8 = 1;

/// The value a key maps to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexValue {
    /// Bytes stored inside the leaf.
    Inline(Vec<u8>),
    /// Reference to content stored as a separate block.
    Handle(ContentId),
}

impl IndexValue {
    /// The handle, if this value refers to separately stored content.
    pub fn handle(&self) -> Option<&ContentId> {
        match self {
            Self::Handle(id) => Some(id),
            Self::Inline(_) => None,
        }
    }
}

impl From<Vec<u8>> for IndexValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Inline(bytes)
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::Inline(s.as_bytes().to_vec())
    }
}

impl From<ContentId> for IndexValue {
    fn from(id: ContentId) -> Self {
        Self::Handle(id)
    }
}

/// Terminal node holding one key and its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub key: String,
    pub value: IndexValue,
}

/// One slot → child edge of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub slot: u8,
    pub child: ContentId,
}

/// Interior node: up to 16 edges sorted by slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Branch {
    edges: Vec<Edge>,
}

impl Branch {
    /// A branch with no edges. Never stored as-is.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The child at `slot`, if any.
    pub fn child(&self, slot: u8) -> Option<ContentId> {
        self.edges
            .binary_search_by_key(&slot, |e| e.slot)
            .ok()
            .map(|i| self.edges[i].child)
    }

    /// Set (or replace) the edge at `slot`, keeping edges sorted.
    pub fn set(&mut self, slot: u8, child: ContentId) {
        debug_assert!((slot as usize) < FAN_OUT);
        match self.edges.binary_search_by_key(&slot, |e| e.slot) {
            Ok(i) => self.edges[i].child = child,
            Err(i) => self.edges.insert(i, Edge { slot, child }),
        }
    }

    /// Builder form of [`Branch::set`].
    pub fn with(mut self, slot: u8, child: ContentId) -> Self {
        self.set(slot, child);
        self
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// A content-addressed unit of the index tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

impl Node {
    /// Canonical encoding of this node.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        match self {
            Node::Leaf(leaf) => {
                buf.push(TAG_LEAF);
                put_bytes(&mut buf, leaf.key.as_bytes());
                match &leaf.value {
                    IndexValue::Inline(bytes) => {
                        buf.push(VALUE_INLINE);
                        put_bytes(&mut buf, bytes);
                    }
                    IndexValue::Handle(id) => {
                        buf.push(VALUE_HANDLE);
                        buf.extend_from_slice(id.as_bytes());
                    }
                }
            }
            Node::Branch(branch) => {
                buf.push(TAG_BRANCH);
                buf.push(branch.edges.len() as u8);
                for edge in &branch.edges {
                    buf.push(edge.slot);
                    buf.extend_from_slice(edge.child.as_bytes());
                }
            }
        }
        buf
    }

    /// Decode the block `id`, rejecting any non-canonical encoding.
    pub fn decode(id: &ContentId, data: &[u8]) -> IndexResult<Self> {
        let corrupt = |reason: String| IndexError::Corrupt { id: *id, reason };
        let mut r = Reader { data, pos: 0 };

        if r.take(MAGIC.len()).map_err(&corrupt)? != MAGIC {
            return Err(corrupt("bad magic".into()));
        }
        let version = r.u8().map_err(&corrupt)?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }

        let node = match r.u8().map_err(&corrupt)? {
            TAG_LEAF => {
                let key = String::from_utf8(r.bytes().map_err(&corrupt)?.to_vec())
                    .map_err(|e| corrupt(format!("key is not utf-8: {e}")))?;
                let value = match r.u8().map_err(&corrupt)? {
                    VALUE_INLINE => IndexValue::Inline(r.bytes().map_err(&corrupt)?.to_vec()),
                    VALUE_HANDLE => IndexValue::Handle(r.id().map_err(&corrupt)?),
                    other => return Err(corrupt(format!("unknown value tag {other}"))),
                };
                Node::Leaf(Leaf { key, value })
            }
            TAG_BRANCH => {
                let count = r.u8().map_err(&corrupt)? as usize;
                if count == 0 || count > FAN_OUT {
                    return Err(corrupt(format!("invalid edge count {count}")));
                }
                let mut edges: Vec<Edge> = Vec::with_capacity(count);
                for _ in 0..count {
                    let slot = r.u8().map_err(&corrupt)?;
                    if slot as usize >= FAN_OUT {
                        return Err(corrupt(format!("slot {slot} out of range")));
                    }
                    if edges.last().is_some_and(|e| e.slot >= slot) {
                        return Err(corrupt("edges not strictly ascending".into()));
                    }
                    let child = r.id().map_err(&corrupt)?;
                    edges.push(Edge { slot, child });
                }
                Node::Branch(Branch { edges })
            }
            other => return Err(corrupt(format!("unknown node tag {other}"))),
        };

        if r.pos != data.len() {
            return Err(corrupt(format!("{} trailing bytes", data.len() - r.pos)));
        }
        Ok(node)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| format!("truncated at offset {}", self.pos))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn bytes(&mut self) -> Result<&'a [u8], String> {
        let raw = self.take(4)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        self.take(len)
    }

    fn id(&mut self) -> Result<ContentId, String> {
        ContentId::from_slice(self.take(32)?).map_err(|e| e.to_string())
    }
}
