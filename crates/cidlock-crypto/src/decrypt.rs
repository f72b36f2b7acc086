//! Envelope decryption
//!
//! Reverses [`crate::encrypt::encrypt`]. The ciphertext blob is fetched by the
//! caller using `record.cid_of_encrypted_buffer_str` and passed in here.
//! Any failure aborts the whole operation; no partial plaintext is returned.

use crate::cipher::{open_content, open_with_user_key};
use crate::content_id::ContentId;
use crate::envelope::{decode_field, EnvelopeRecord, FileMetadata, PlaintextFile, RetrievalMode};
use crate::error::CryptoError;
use crate::keys::{derive_content_key, UserKey};
use crate::IV_SIZE;

/// Decrypt a file from its envelope record and ciphertext blob.
///
/// In [`RetrievalMode::Original`] the plaintext CID is unwrapped with
/// `user_key` and the metadata is opened with it. In
/// [`RetrievalMode::Public`] both are read as plaintext from a published
/// record, so `user_key` is not consulted and any signed-in user can open it.
pub fn decrypt(
    record: &EnvelopeRecord,
    user_key: &UserKey,
    ciphertext: &[u8],
    mode: RetrievalMode,
) -> Result<PlaintextFile, CryptoError> {
    let (cid, metadata) = match mode {
        RetrievalMode::Original => {
            let iv = record.iv()?;
            let cid = unwrap_with_iv(record, user_key, &iv)?;
            (cid, open_metadata(record, user_key, &iv)?)
        }
        RetrievalMode::Public => {
            let plain = record.cid_original_str.as_deref().ok_or_else(|| {
                CryptoError::malformed("cidOriginalStr is required for public retrieval")
            })?;
            let metadata = record.metadata.clone().ok_or_else(|| {
                CryptoError::malformed("metadata is required for public retrieval")
            })?;
            (ContentId::parse(plain)?, metadata)
        }
    };

    let content_key = derive_content_key(&cid);
    let bytes = open_content(&content_key, ciphertext)?;

    Ok(PlaintextFile { bytes, metadata })
}

/// Recover the plaintext CID wrapped under `user_key`.
pub fn unwrap_content_id(record: &EnvelopeRecord, user_key: &UserKey) -> Result<ContentId, CryptoError> {
    let iv = record.iv()?;
    unwrap_with_iv(record, user_key, &iv)
}

/// Derive the shareable form of an owned record: the same envelope fields,
/// plus the unwrapped `cidOriginalStr` and the decrypted metadata in the
/// clear. The backend `id` is dropped; it names the owner's stored upload.
///
/// Fails with `DecryptionFailed` unless `user_key` owns the record, checked
/// against both the wrapped CID and the metadata.
pub fn publish_record(record: &EnvelopeRecord, user_key: &UserKey) -> Result<EnvelopeRecord, CryptoError> {
    let iv = record.iv()?;
    let cid = unwrap_with_iv(record, user_key, &iv)?;
    let metadata = open_metadata(record, user_key, &iv)?;

    Ok(EnvelopeRecord {
        cid_original_str: Some(cid.into_inner()),
        metadata: Some(metadata),
        id: None,
        ..record.clone()
    })
}

fn unwrap_with_iv(
    record: &EnvelopeRecord,
    user_key: &UserKey,
    iv: &[u8; IV_SIZE],
) -> Result<ContentId, CryptoError> {
    let wrapped = record.cid_encrypted_original_str.as_deref().ok_or_else(|| {
        CryptoError::malformed("cidEncryptedOriginalStr is required for original retrieval")
    })?;
    let wrapped = decode_field("cidEncryptedOriginalStr", wrapped)?;
    let cid_bytes = open_with_user_key(user_key, iv, &wrapped)?;
    let cid_str = String::from_utf8(cid_bytes)
        .map_err(|_| CryptoError::malformed("unwrapped identifier is not UTF-8"))?;
    ContentId::parse(&cid_str)
}

fn open_metadata(
    record: &EnvelopeRecord,
    user_key: &UserKey,
    iv: &[u8; IV_SIZE],
) -> Result<FileMetadata, CryptoError> {
    let encrypted = decode_field("encryptedMetadataStr", &record.encrypted_metadata_str)?;
    let json = open_with_user_key(user_key, iv, &encrypted)?;
    serde_json::from_slice(&json).map_err(|e| CryptoError::malformed(format!("metadata JSON: {e}")))
}
