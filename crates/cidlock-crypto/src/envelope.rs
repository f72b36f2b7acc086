//! Envelope data model
//!
//! An upload produces one [`EncryptedEnvelope`]: the ciphertext blob plus the
//! text fields that let the owner recover it. The text fields travel and
//! persist as an [`EnvelopeRecord`] JSON document using the wire names the
//! backend API expects; the blob is stored separately, keyed by
//! `cidOfEncryptedBufferStr`.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::IV_SIZE;

/// Descriptive fields of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            last_modified: None,
        }
    }
}

/// Raw file bytes together with their metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextFile {
    pub bytes: Vec<u8>,
    pub metadata: FileMetadata,
}

impl PlaintextFile {
    /// Build a file whose metadata size matches `bytes`.
    pub fn new(bytes: Vec<u8>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            metadata: FileMetadata::new(name, mime_type, size),
        }
    }
}

impl fmt::Debug for PlaintextFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextFile")
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Everything produced by one upload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// File bytes encrypted under the content key
    pub encrypted_file_blob: Vec<u8>,
    /// Metadata JSON encrypted under the user key (base64)
    pub encrypted_metadata_str: String,
    /// IV of the user-keyed layer (base64)
    pub iv_string: String,
    /// CID of `encrypted_file_blob`; the backend storage key
    pub cid_of_encrypted_buffer_str: String,
    /// Plaintext CID encrypted under the user key (base64)
    pub cid_encrypted_original_str: String,
}

impl EncryptedEnvelope {
    /// The text half of the envelope, as persisted next to the blob.
    pub fn record(&self) -> EnvelopeRecord {
        EnvelopeRecord {
            encrypted_metadata_str: self.encrypted_metadata_str.clone(),
            iv_string: self.iv_string.clone(),
            cid_of_encrypted_buffer_str: self.cid_of_encrypted_buffer_str.clone(),
            cid_encrypted_original_str: Some(self.cid_encrypted_original_str.clone()),
            cid_original_str: None,
            metadata: None,
            id: None,
        }
    }
}

impl fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field(
                "encrypted_file_blob",
                &format_args!("[{} bytes]", self.encrypted_file_blob.len()),
            )
            .field("cid_of_encrypted_buffer_str", &self.cid_of_encrypted_buffer_str)
            .finish_non_exhaustive()
    }
}

/// Persisted/transmitted text fields of an envelope.
///
/// `cid_encrypted_original_str` is set on records produced by an upload.
/// `cid_original_str` and `metadata` are only set on published records,
/// which expose the plaintext identifier and file metadata on purpose.
///
/// `id` names one stored upload on its backend. Several uploads can share a
/// blob, so deletes go by `id` rather than by `cidOfEncryptedBufferStr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecord {
    pub encrypted_metadata_str: String,
    pub iv_string: String,
    pub cid_of_encrypted_buffer_str: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid_encrypted_original_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid_original_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl EnvelopeRecord {
    /// Decode and length-check `iv_string`.
    pub fn iv(&self) -> Result<[u8; IV_SIZE], CryptoError> {
        let bytes = decode_field("ivString", &self.iv_string)?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::malformed(format!(
                "ivString decodes to {} bytes (expected {IV_SIZE})",
                bytes.len()
            ))
        })
    }

    /// True if this record carries a plaintext identifier.
    pub fn is_public(&self) -> bool {
        self.cid_original_str.is_some()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CryptoError::EncryptionFailed(format!("record serialization: {e}")))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        serde_json::from_slice(data)
            .map_err(|e| CryptoError::malformed(format!("record deserialization: {e}")))
    }
}

/// Which identifier a retrieval should trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Identifier is wrapped under the user key
    #[default]
    Original,
    /// Identifier is stored as plaintext (shareable content)
    Public,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Original => "original",
            RetrievalMode::Public => "public",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(RetrievalMode::Original),
            "public" => Ok(RetrievalMode::Public),
            other => Err(CryptoError::UnsupportedMode(other.to_string())),
        }
    }
}

pub(crate) fn encode_field(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub(crate) fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::malformed(format!("{field}: base64 decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> EnvelopeRecord {
        EnvelopeRecord {
            encrypted_metadata_str: encode_field(b"meta"),
            iv_string: encode_field(&[9u8; IV_SIZE]),
            cid_of_encrypted_buffer_str: "bafkreiexample".to_string(),
            cid_encrypted_original_str: Some(encode_field(b"wrapped")),
            cid_original_str: None,
            metadata: None,
            id: None,
        }
    }

    #[test]
    fn test_record_wire_names() {
        let json = String::from_utf8(sample_record().to_bytes().unwrap()).unwrap();

        for field in [
            "encryptedMetadataStr",
            "ivString",
            "cidOfEncryptedBufferStr",
            "cidEncryptedOriginalStr",
        ] {
            assert!(json.contains(field), "missing wire field {field}: {json}");
        }
        assert!(!json.contains("cidOriginalStr"), "private record must not expose the plain CID");
        assert!(!json.contains("\"metadata\""), "private record must not expose metadata");
        assert!(!json.contains("\"ID\""));
    }

    #[test]
    fn test_record_id_wire_name() {
        let mut record = sample_record();
        record.id = Some("42".to_string());
        let json = String::from_utf8(record.to_bytes().unwrap()).unwrap();
        assert!(json.contains(r#""ID": "42""#), "{json}");
        assert_eq!(EnvelopeRecord::from_bytes(json.as_bytes()).unwrap(), record);
    }

    #[test]
    fn test_metadata_wire_names() {
        let meta = FileMetadata::new("a.txt", "text/plain", 5);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"name":"a.txt","type":"text/plain","size":5}"#);
    }

    #[test]
    fn test_iv_decodes() {
        assert_eq!(sample_record().iv().unwrap(), [9u8; IV_SIZE]);
    }

    #[test]
    fn test_iv_wrong_length() {
        let mut record = sample_record();
        record.iv_string = encode_field(&[0u8; 12]);
        assert!(matches!(record.iv(), Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_iv_bad_base64() {
        let mut record = sample_record();
        record.iv_string = "!!not base64!!".to_string();
        assert!(matches!(record.iv(), Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_record_missing_field_is_malformed() {
        let result = EnvelopeRecord::from_bytes(br#"{"ivString":"AAAA"}"#);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_retrieval_mode_parse() {
        assert_eq!("original".parse::<RetrievalMode>().unwrap(), RetrievalMode::Original);
        assert_eq!("public".parse::<RetrievalMode>().unwrap(), RetrievalMode::Public);

        let err = "shared".parse::<RetrievalMode>().unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedMode(ref m) if m == "shared"));
    }
}
