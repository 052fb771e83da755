use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Number of raw bytes in a content id.
pub const ID_LEN: usize = 20;

/// Identifier of a blob, tree or commit: the SHA-1 of its canonical encoding.
///
/// Identical content always yields an identical id, which is what makes ids safe
/// to use as cache-key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId([u8; ID_LEN]);

impl ContentId {
    /// The null id (all zeros). Never names a real object.
    pub const NULL: Self = Self([0u8; ID_LEN]);

    /// Id of the empty tree (`4b825dc642cb6eb9a060e54bf8d69288fbee4904`).
    pub const EMPTY_TREE: Self = Self([
        0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
        0x88, 0xfb, 0xee, 0x49, 0x04,
    ]);

    /// Wrap raw digest bytes.
    pub const fn from_raw(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a ContentId from a byte slice of exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != ID_LEN {
            return Err(HashError::InvalidHashLength {
                expected: ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create a ContentId from a 40-character hex string (case-insensitive).
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; ID_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if this is the null (all-zeros) id.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Full lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// The first `len` hex digits (clamped to the full length).
    pub fn abbreviate(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(ID_LEN * 2));
        hex
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.abbreviate(8))
    }
}

impl FromStr for ContentId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
