use sha1::{Digest, Sha1};

use crate::oid::ID_LEN;
use crate::ContentId;

/// Streaming SHA-1 computation producing a [`ContentId`].
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through the
/// [`std::io::Write`] implementation.
#[derive(Default)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the id.
    pub fn finalize(self) -> ContentId {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(digest.as_slice());
        ContentId::from_raw(bytes)
    }

    /// Hash an object with git's `"<kind> <len>\0"` header.
    pub fn hash_object(kind: &str, data: &[u8]) -> ContentId {
        let mut h = Self::new();
        h.update(kind.as_bytes());
        h.update(b" ");
        h.update(data.len().to_string().as_bytes());
        h.update(b"\0");
        h.update(data);
        h.finalize()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
