//! cidlock-core: configuration schema and shared error type

pub mod config;
pub mod error;

pub use config::CidlockConfig;
pub use error::{CidlockError, CidlockResult};
