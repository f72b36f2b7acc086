use thiserror::Error;

pub type CidlockResult<T> = Result<T, CidlockError>;

#[derive(Debug, Error)]
pub enum CidlockError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
