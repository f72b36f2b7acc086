//! Key derivation: wallet signature → UserKey, content identifier → ContentKey
//!
//! Both keys follow the same hash-then-import pattern: the SHA-256 digest of
//! the UTF-8 input is used directly as the AES-256 key. The user key is keyed
//! by who the user is, the content key by what the content is.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::content_id::ContentId;
use crate::error::CryptoError;
use crate::KEY_SIZE;

/// A 256-bit key derived from the user's wallet signature.
///
/// Zeroized on drop. Never persisted or transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct UserKey {
    bytes: [u8; KEY_SIZE],
}

impl UserKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for UserKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit key derived from a plaintext content identifier.
///
/// Only ever used with the fixed zero IV, which is safe because a distinct
/// plaintext always produces a distinct key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the user key from a wallet signature: `SHA-256(signature)`.
///
/// Deterministic, so a returning user with the same signature can open every
/// envelope stored earlier. An empty signature is treated as no signature.
pub fn derive_user_key(signature: &SecretString) -> Result<UserKey, CryptoError> {
    let signature = signature.expose_secret();
    if signature.is_empty() {
        return Err(CryptoError::MissingSecret);
    }
    Ok(UserKey::from_bytes(sha256(signature.as_bytes())))
}

/// Derive the content key from a plaintext CID: `SHA-256(cidStr)`.
pub fn derive_content_key(cid: &ContentId) -> ContentKey {
    ContentKey {
        bytes: sha256(cid.as_str().as_bytes()),
    }
}

fn sha256(data: &[u8]) -> [u8; KEY_SIZE] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&digest);
    out
}
