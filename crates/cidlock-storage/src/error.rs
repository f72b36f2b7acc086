use thiserror::Error;

/// Failures talking to an envelope backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("record for {0} carries no backend id; delete it with the record saved at upload")]
    MissingRecordId(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    #[error("corrupt object at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Map an OpenDAL error, turning its NotFound kind into ours.
    pub(crate) fn from_opendal(path: &str, err: opendal::Error) -> Self {
        if err.kind() == opendal::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Backend(err)
        }
    }
}
