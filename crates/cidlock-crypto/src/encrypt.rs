//! Envelope encryption
//!
//! Steps, in order (each consumes the previous step's output):
//! 1. fresh random IV for the user-keyed layer
//! 2. metadata JSON → AES-GCM(UserKey, iv) → base64
//! 3. cidStr = CID(plaintext)
//! 4. ContentKey = SHA-256(cidStr)
//! 5. blob = AES-GCM(ContentKey, zero IV, plaintext); storage key = CID(blob)
//! 6. cidStr → AES-GCM(UserKey, iv) → base64
//!
//! Pure computation: no network or storage access.

use crate::cipher::{generate_iv, seal_content, seal_with_user_key};
use crate::content_id::compute_cid;
use crate::envelope::{encode_field, EncryptedEnvelope, PlaintextFile};
use crate::error::CryptoError;
use crate::keys::{derive_content_key, UserKey};

/// Encrypt a file into an envelope owned by `user_key`.
///
/// Encrypting identical bytes twice yields the same `encrypted_file_blob` and
/// `cid_of_encrypted_buffer_str`; the user-keyed fields differ because a fresh
/// IV is drawn each time.
pub fn encrypt(file: &PlaintextFile, user_key: &UserKey) -> Result<EncryptedEnvelope, CryptoError> {
    let iv = generate_iv();

    let metadata_json = serde_json::to_vec(&file.metadata)
        .map_err(|e| CryptoError::EncryptionFailed(format!("metadata serialization: {e}")))?;
    let encrypted_metadata = seal_with_user_key(user_key, &iv, &metadata_json)?;

    let cid = compute_cid(&file.bytes);
    let content_key = derive_content_key(&cid);

    let encrypted_file_blob = seal_content(&content_key, &file.bytes)?;
    let cid_of_encrypted_buffer = compute_cid(&encrypted_file_blob);

    let wrapped_cid = seal_with_user_key(user_key, &iv, cid.as_str().as_bytes())?;

    Ok(EncryptedEnvelope {
        encrypted_file_blob,
        encrypted_metadata_str: encode_field(&encrypted_metadata),
        iv_string: encode_field(&iv),
        cid_of_encrypted_buffer_str: cid_of_encrypted_buffer.into_inner(),
        cid_encrypted_original_str: encode_field(&wrapped_cid),
    })
}
