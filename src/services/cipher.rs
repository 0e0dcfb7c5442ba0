// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token encryption at rest (AES-256-GCM).
//!
//! Output layout: `nonce (12) || ciphertext || tag (16)`. A fresh random
//! nonce is drawn for every call, so sealing the same plaintext twice never
//! yields the same bytes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;

/// Required key size in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key must be base64 of exactly {KEY_LEN} bytes")]
    InvalidKey,

    #[error("Ciphertext too short ({0} bytes)")]
    MalformedInput(usize),

    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,

    #[error("Decrypted token is not valid UTF-8")]
    InvalidUtf8,

    #[error("Encryption failed")]
    Encryption,
}

/// Authenticated symmetric cipher for OAuth tokens.
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Build from a base64-encoded 256-bit key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, CipherError> {
        let bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|_| CipherError::InvalidKey)?;
        Self::new(&bytes)
    }

    /// Build from raw key bytes. Fails unless exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey);
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Encryption)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CipherError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::MalformedInput(sealed.len()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CipherError::MalformedInput(sealed.len()))?;

        let mut buf = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| CipherError::AuthenticationFailed)?;
        Ok(plaintext.to_vec())
    }

    pub fn decrypt_string(&self, sealed: &[u8]) -> Result<String, CipherError> {
        String::from_utf8(self.decrypt(sealed)?).map_err(|_| CipherError::InvalidUtf8)
    }
}

/// Seal an access/refresh token pair before storing.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: &str,
) -> Result<(Vec<u8>, Vec<u8>), CipherError> {
    let encrypted_access = cipher.encrypt(access_token.as_bytes())?;
    let encrypted_refresh = cipher.encrypt(refresh_token.as_bytes())?;
    Ok((encrypted_access, encrypted_refresh))
}

/// Open an access/refresh token pair after retrieval.
pub fn decrypt_tokens(
    cipher: &TokenCipher,
    encrypted_access: &[u8],
    encrypted_refresh: &[u8],
) -> Result<(String, String), CipherError> {
    let access_token = cipher.decrypt_string(encrypted_access)?;
    let refresh_token = cipher.decrypt_string(encrypted_refresh)?;
    Ok((access_token, refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_round_trip_various_lengths() {
        let c = cipher();
        for len in [0usize, 1, 15, 16, 17, 255, 4096] {
            let p: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let sealed = c.encrypt(&p).unwrap();
            assert_eq!(sealed.len(), NONCE_LEN + len + TAG_LEN);
            assert_eq!(c.decrypt(&sealed).unwrap(), p, "len {}", len);
        }
    }

    #[test]
    fn test_same_plaintext_never_repeats() {
        let c = cipher();
        let a = c.encrypt(b"refresh-token").unwrap();
        let b = c.encrypt(b"refresh-token").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let c = cipher();
        let sealed = c.encrypt(b"access-token-value").unwrap();
        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    c.decrypt(&tampered),
                    Err(CipherError::AuthenticationFailed),
                    "flip at byte {} bit {}",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_short_input_is_malformed() {
        let c = cipher();
        for len in 0..(NONCE_LEN + TAG_LEN) {
            let input = vec![0u8; len];
            assert_eq!(c.decrypt(&input), Err(CipherError::MalformedInput(len)));
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = cipher().encrypt(b"secret").unwrap();
        let other = TokenCipher::new(&[8u8; KEY_LEN]).unwrap();
        assert_eq!(
            other.decrypt(&sealed),
            Err(CipherError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_key_must_be_32_bytes() {
        assert_eq!(
            TokenCipher::new(&[0u8; 16]).unwrap_err(),
            CipherError::InvalidKey
        );
        // 31 bytes, base64
        let short = BASE64.encode([1u8; 31]);
        assert!(TokenCipher::from_base64_key(&short).is_err());
        assert!(TokenCipher::from_base64_key("not base64!").is_err());

        let ok = BASE64.encode([1u8; 32]);
        assert!(TokenCipher::from_base64_key(&ok).is_ok());
    }

    #[test]
    fn test_token_pair_helpers() {
        let c = cipher();
        let (a, r) = encrypt_tokens(&c, "acc", "ref").unwrap();
        assert_eq!(
            decrypt_tokens(&c, &a, &r).unwrap(),
            ("acc".to_string(), "ref".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(format!("{:?}", cipher()).contains("REDACTED"));
    }
}
