//! Fingerprints for linked note blocks and composed section content.

use sha2::{Digest as _, Sha256};

/// A block fingerprint: 64 hex chars, always lowercase.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BlockHash(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

/// Fingerprint a block body exactly as it appears in the note.
///
/// No normalization: any single-byte edit inside the block, whitespace
/// included, must produce a different hash.
pub fn hash_block(text: &str) -> BlockHash {
    let digest = Sha256::digest(text.as_bytes());
    return BlockHash(format!("{digest:x}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_lowercase_hex() {
        let hash = hash_block("Duration: 3 days\n");
        assert_eq!(hash.0.len(), 64);
        assert!(hash.0.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn whitespace_edits_change_the_hash() {
        assert_ne!(hash_block("a b\n"), hash_block("a  b\n"));
        assert_ne!(hash_block("a b\n"), hash_block("a b"));
    }

    #[test]
    fn same_text_same_hash() {
        assert_eq!(hash_block("Linked\n"), hash_block("Linked\n"));
    }
}
