//! Cache key derivation
//!
//! Every reader and writer of either tier goes through [`cache_key`].

use sha2::{Digest, Sha256};

/// Length of a derived key: hex-encoded SHA-256
pub const KEY_LEN: usize = 64;

/// Generate a cache key from a request URL
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `key` has the shape produced by [`cache_key`]
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_generation() {
        let key1 = cache_key("https://example.com/cat.png");
        let key2 = cache_key("https://example.com/cat.png");
        let key3 = cache_key("https://example.com/dog.png");

        // Same inputs produce same key
        assert_eq!(key1, key2);

        // Different inputs produce different keys
        assert_ne!(key1, key3);

        // Keys are hex strings (64 chars for SHA256)
        assert_eq!(key1.len(), 64);
        assert!(key1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_key_known_vector() {
        // sha256("")
        assert_eq!(
            cache_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key(&cache_key("https://example.com/")));
        assert!(!is_valid_key("../../etc/passwd"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(&"A".repeat(64)));
        assert!(!is_valid_key(&format!("{}/", "a".repeat(63))));
    }
}
