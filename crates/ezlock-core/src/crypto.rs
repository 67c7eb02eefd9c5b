//! The command cipher shared with lock hardware.
//!
//! AES in CBC mode with PKCS#7 padding, keyed by the lock's secret. The key
//! length selects the variant (16, 24 or 32 bytes for AES-128/192/256). On
//! the wire a token is `base64(IV || ciphertext)` with a fresh random IV per
//! token.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{CoreError, Result};
use crate::model::LockSecret;

/// AES block size, which is also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// A 128-bit CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandIv(pub [u8; BLOCK_SIZE]);

impl CommandIv {
    /// Generate a new random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }
}

/// Check that a secret can key the cipher.
pub fn validate_secret(secret: &LockSecret) -> Result<()> {
    match secret.len() {
        16 | 24 | 32 => Ok(()),
        n => Err(CoreError::CryptoFailure(format!(
            "invalid key length: expected 16, 24 or 32 bytes, got {}",
            n
        ))),
    }
}

/// Encrypt `plaintext` under a fresh random IV and encode for the wire.
pub fn seal(secret: &LockSecret, plaintext: &[u8]) -> Result<String> {
    seal_with_iv(secret, &CommandIv::generate(), plaintext)
}

/// Encrypt under a caller-chosen IV. Deterministic; used for test vectors.
pub fn seal_with_iv(secret: &LockSecret, iv: &CommandIv, plaintext: &[u8]) -> Result<String> {
    validate_secret(secret)?;

    let key = secret.as_bytes();
    let iv_bytes = iv.as_bytes().as_slice();

    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv_bytes)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv_bytes)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv_bytes)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
    }
    .map_err(|e| CoreError::CryptoFailure(e.to_string()))?;

    let mut wire = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    wire.extend_from_slice(iv.as_bytes());
    wire.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(wire))
}

/// Decode a wire token and decrypt it.
pub fn open(secret: &LockSecret, token: &str) -> Result<Vec<u8>> {
    validate_secret(secret)?;

    let wire = STANDARD
        .decode(token.trim())
        .map_err(|e| CoreError::CryptoFailure(format!("malformed base64: {}", e)))?;

    if wire.len() < BLOCK_SIZE {
        return Err(CoreError::CryptoFailure("ciphertext too short".into()));
    }
    let (iv, ciphertext) = wire.split_at(BLOCK_SIZE);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CoreError::CryptoFailure(
            "ciphertext is not a multiple of the block size".into(),
        ));
    }

    let key = secret.as_bytes();
    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
    }
    .map_err(|e| CoreError::CryptoFailure(e.to_string()))?
    .map_err(|_| CoreError::CryptoFailure("padding length out of range".into()))?;

    Ok(plaintext)
}
