//! cidlock-storage: where envelopes live
//!
//! [`EnvelopeBackend`] is the seam between the transfer pipelines and a
//! store. Two implementations:
//!
//! - [`OperatorBackend`]: any OpenDAL operator (S3, local fs, memory)
//! - [`HttpBackend`]: the cidlock HTTP file API with bearer authentication

pub mod backend;
pub mod error;
pub mod health;
pub mod http;
pub mod operator;

pub use backend::{open_backend, EnvelopeBackend, OperatorBackend, UploadReceipt};
pub use error::{StorageError, StorageResult};
pub use health::check_health;
pub use http::HttpBackend;
pub use operator::{build_fs_operator, build_memory_operator, build_operator, S3Settings};
