use pcache_types::ContentId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a block and a key digest over identical bytes never
/// collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored blocks (nodes and blobs alike).
    pub const BLOCK: Self = Self {
        domain: "pcache-block-v1",
    };
    /// Hasher for index keys. Part of the canonical tree layout.
    pub const PATH: Self = Self {
        domain: "pcache-path-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation, returning the digest.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash raw bytes with domain separation, returning a [`ContentId`].
    pub fn hash(&self, data: &[u8]) -> ContentId {
        ContentId::from_hash(self.digest(data))
    }

    /// Verify that data produces the expected identifier.
    pub fn verify(&self, data: &[u8], expected: &ContentId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
