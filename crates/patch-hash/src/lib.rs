//! Content identity for the patch diff cache.
//!
//! Provides the `ContentId` type (a SHA-1 digest over git's canonical object
//! encoding), hex encoding/decoding and streaming object hashing. Ids are plain
//! values: cheap to copy, compared by bytes, usable directly as cache-key material.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ContentId;
