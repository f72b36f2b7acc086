use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by envelope operations.
///
/// Every variant is terminal for the operation that produced it. Callers
/// branch on the variant: `MissingSecret` means the wallet signature has to
/// be obtained again, `MalformedEnvelope` and `DecryptionFailed` mean the
/// stored data is corrupt, tampered with, or belongs to someone else.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no wallet signature available in this session")]
    MissingSecret,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("decryption failed: wrong key, corrupted or tampered data")]
    DecryptionFailed,

    #[error("unsupported retrieval mode: {0:?} (expected \"original\" or \"public\")")]
    UnsupportedMode(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

impl CryptoError {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedEnvelope(what.into())
    }
}
