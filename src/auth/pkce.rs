//! PKCE (Proof Key for Code Exchange) and random string utilities
//!
//! The verifier handed to providers is the URL-safe SHA-256 digest of a
//! random string, and the same value is sent as a `plain` challenge.

use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Default length of the random string behind a verifier
pub const DEFAULT_VERIFIER_SOURCE_LENGTH: usize = 128;

/// Challenge method announced to providers
pub const CODE_CHALLENGE_METHOD: &str = "plain";

/// Unreserved URI characters per RFC 3986
const RANDOM_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Generate `length` characters drawn uniformly from the unreserved charset
pub fn generate_random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..RANDOM_CHARSET.len());
            RANDOM_CHARSET[idx] as char
        })
        .collect()
}

/// Derive the URL-safe SHA-256 digest of `source`
///
/// Equivalent to base64 with `=` stripped, `+` mapped to `-` and `/` to `_`.
pub fn code_challenge(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a verifier from `length` random characters
pub fn generate_verifier_code(length: usize) -> String {
    code_challenge(&generate_random_string(length))
}

/// Base64-encode `parts` joined with `:` (HTTP Basic credentials)
pub fn to_base64(parts: &[&str]) -> String {
    STANDARD.encode(parts.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_length_and_charset() {
        let value = generate_random_string(256);
        assert_eq!(value.len(), 256);

        let charset = std::str::from_utf8(RANDOM_CHARSET).unwrap();
        for c in value.chars() {
            assert!(charset.contains(c), "Invalid character: {}", c);
        }
    }

    #[test]
    fn test_random_strings_are_unique() {
        assert_ne!(generate_random_string(32), generate_random_string(32));
    }

    #[test]
    fn test_code_challenge_is_deterministic() {
        let a = code_challenge("the same source");
        let b = code_challenge("the same source");
        assert_eq!(a, b);
        assert_ne!(a, code_challenge("another source"));
    }

    #[test]
    fn test_code_challenge_matches_escaped_base64() {
        let source = generate_random_string(DEFAULT_VERIFIER_SOURCE_LENGTH);
        let digest = Sha256::digest(source.as_bytes());
        let escaped = STANDARD
            .encode(digest)
            .replace('=', "")
            .replace('+', "-")
            .replace('/', "_");

        assert_eq!(code_challenge(&source), escaped);
    }

    #[test]
    fn test_verifier_format() {
        for _ in 0..50 {
            let verifier = generate_verifier_code(DEFAULT_VERIFIER_SOURCE_LENGTH);
            // 32 digest bytes, unpadded
            assert_eq!(verifier.len(), 43);
            assert!(!verifier.contains('+'));
            assert!(!verifier.contains('/'));
            assert!(!verifier.contains('='));
        }
    }

    #[test]
    fn test_to_base64() {
        assert_eq!(to_base64(&["client", "secret"]), "Y2xpZW50OnNlY3JldA==");
    }
}
