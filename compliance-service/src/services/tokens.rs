//! Opaque tokens for invitation, NDA and access links, and API keys.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix that identifies API keys issued by this service.
pub const API_KEY_PREFIX: &str = "cpk_";

/// 32 random bytes, hex encoded (64 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of the token, hex encoded. Used where only a lookup hash is stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A freshly issued API key: the plaintext is shown once.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub plaintext: String,
    /// First characters, kept for display.
    pub prefix: String,
    pub hash: String,
}

pub fn generate_api_key() -> IssuedApiKey {
    let plaintext = format!("{}{}", API_KEY_PREFIX, generate_token());
    IssuedApiKey {
        prefix: plaintext.chars().take(API_KEY_PREFIX.len() + 8).collect(),
        hash: hash_token(&plaintext),
        plaintext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn api_key_prefix_and_hash() {
        let key = generate_api_key();
        assert!(key.plaintext.starts_with(API_KEY_PREFIX));
        assert_eq!(key.prefix.len(), API_KEY_PREFIX.len() + 8);
        assert!(key.plaintext.starts_with(&key.prefix));
        assert_eq!(key.hash, hash_token(&key.plaintext));
    }
}
