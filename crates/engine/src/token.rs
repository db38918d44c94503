//! Runner credential hashing (SPEC §6 "Runner-token bytes", §4.4).
//!
//! Both the long-lived runner credential and the per-registration session
//! token are stored only as `base64url(sha256(token))`, unpadded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// 32 bytes of OS entropy, URL-safe base64 encoded (43 chars, unpadded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_sufficiently_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.len() >= 43);
        assert_ne!(a, b);
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}
