//! Hashing utilities for admin API key verification.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns true if `hash` looks like a SHA-256 hex digest.
pub fn is_sha256_hex(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Checks a presented key against a stored SHA-256 hex digest.
///
/// The comparison walks the full digest regardless of where the first
/// mismatch occurs.
pub fn verify_key(presented: &str, expected_hash: &str) -> bool {
    let actual = sha256_hex(presented);
    let expected = expected_hash.to_ascii_lowercase();

    if actual.len() != expected.len() {
        return false;
    }

    actual
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("test");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_sha256_hex_empty_string() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex("anything")));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"z".repeat(64)));
    }

    #[test]
    fn test_verify_key_matches() {
        let hash = sha256_hex("cr_admin_secret");
        assert!(verify_key("cr_admin_secret", &hash));
    }

    #[test]
    fn test_verify_key_accepts_uppercase_digest() {
        let hash = sha256_hex("cr_admin_secret").to_uppercase();
        assert!(verify_key("cr_admin_secret", &hash));
    }

    #[test]
    fn test_verify_key_rejects_wrong_key() {
        let hash = sha256_hex("cr_admin_secret");
        assert!(!verify_key("cr_admin_secreT", &hash));
        assert!(!verify_key("", &hash));
    }

    #[test]
    fn test_verify_key_rejects_malformed_digest() {
        assert!(!verify_key("cr_admin_secret", "short"));
        assert!(!verify_key("cr_admin_secret", ""));
    }
}
