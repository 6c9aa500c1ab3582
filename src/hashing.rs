//! Hash helpers shared by idea identity, content integrity, and the chain.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex length of every supported digest (both algorithms produce 32 bytes).
pub const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blake3" => Some(Self::Blake3),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn hash_text(self, text: &str) -> String {
        match self {
            Self::Blake3 => blake3::hash(text.as_bytes()).to_hex().to_string(),
            Self::Sha256 => hex::encode(Sha256::digest(text.as_bytes())),
        }
    }

    /// Hash `fields` as a sequence of `len:bytes` frames.
    ///
    /// The byte length in front of every field keeps the encoding injective,
    /// so separator characters inside a field cannot shift into its neighbour.
    pub fn hash_fields(self, fields: &[&str]) -> String {
        match self {
            Self::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for field in fields {
                    hasher.update(frame_prefix(field).as_bytes());
                    hasher.update(field.as_bytes());
                }
                hasher.finalize().to_hex().to_string()
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                for field in fields {
                    hasher.update(frame_prefix(field).as_bytes());
                    hasher.update(field.as_bytes());
                }
                hex::encode(hasher.finalize())
            }
        }
    }
}

fn frame_prefix(field: &str) -> String {
    format!("{}:", field.len())
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_hex_digest(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_lower_hex_of_fixed_length() {
        for alg in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            let digest = alg.hash_fields(&["a", "b"]);
            assert_eq!(digest.len(), DIGEST_HEX_LEN);
            assert!(is_hex_digest(&digest));
            assert_eq!(digest, digest.to_lowercase());
        }
    }

    #[test]
    fn fields_are_length_framed() {
        for alg in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            assert_eq!(alg.hash_fields(&["x", "yz", ""]), alg.hash_text("1:x2:yz0:"));
        }
    }

    #[test]
    fn moving_bytes_between_fields_changes_the_digest() {
        for alg in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            assert_ne!(alg.hash_fields(&["a|b", "c"]), alg.hash_fields(&["a", "b|c"]));
            assert_ne!(alg.hash_fields(&["1:a", ""]), alg.hash_fields(&["1", "1:a"]));
            assert_ne!(alg.hash_fields(&["ab"]), alg.hash_fields(&["a", "b"]));
        }
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            HashAlgorithm::Sha256.hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(HashAlgorithm::parse("SHA-256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("blake3"), Some(HashAlgorithm::Blake3));
        assert_eq!(HashAlgorithm::parse("md5"), None);
    }
}
