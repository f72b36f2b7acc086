//! AES-256-GCM with a 128-bit IV
//!
//! Ciphertext format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The IV is never prefixed: the user-keyed layer carries it in the envelope's
//! `ivString`, and the content-keyed layer always uses `CONTENT_IV`.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes256,
    AesGcm,
};
use rand::RngCore;

use crate::error::CryptoError;
use crate::keys::{ContentKey, UserKey};
use crate::{CONTENT_IV, IV_SIZE, KEY_SIZE, TAG_SIZE};

/// AES-256-GCM parameterised for 16-byte IVs
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Generate a fresh random IV for the user-keyed layer.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt under the user key with the envelope IV.
pub fn seal_with_user_key(
    key: &UserKey,
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    seal(key.as_bytes(), iv, plaintext)
}

/// Decrypt a user-keyed ciphertext.
pub fn open_with_user_key(
    key: &UserKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    open(key.as_bytes(), iv, ciphertext)
}

/// Encrypt file bytes under the content key with the fixed zero IV.
///
/// Deterministic: identical plaintext gives identical output.
pub fn seal_content(key: &ContentKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal(key.as_bytes(), &CONTENT_IV, plaintext)
}

/// Decrypt a content-keyed blob.
pub fn open_content(key: &ContentKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    open(key.as_bytes(), &CONTENT_IV, ciphertext)
}

/// Ciphertext size for a plaintext of `plaintext_size` bytes.
pub fn sealed_size(plaintext_size: usize) -> usize {
    plaintext_size + TAG_SIZE
}

fn seal(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm16::new(key.into());
    cipher
        .encrypt(GenericArray::from_slice(iv), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM seal: {e}")))
}

fn open(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher = Aes256Gcm16::new(key.into());
    cipher
        .decrypt(GenericArray::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
