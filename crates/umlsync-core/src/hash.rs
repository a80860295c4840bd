//! Content hashing.
//!
//! Provides [`ContentHash`], the identity of a rendered artifact and the
//! fingerprint used to decide whether a document needs rewriting.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 digest of a piece of text, hex-encoded.
///
/// Two diagram blocks with identical source text anywhere in the corpus share
/// one hash and therefore one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of the hex-encoded digest.
    pub const LEN: usize = 64;

    /// Compute the hash of `text`.
    ///
    /// # Hash Format
    ///
    /// Lowercase hex SHA-256 of the UTF-8 bytes of `text`, with no
    /// normalization applied.
    #[must_use]
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a hash previously written into a document or used as a file stem.
    ///
    /// Returns `None` unless `value` is exactly [`Self::LEN`] lowercase hex digits.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == Self::LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_owned()))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
