//! cidlock-transfer: the pipelines between a local file and an envelope backend
//!
//! Every pipeline takes the [`cidlock_crypto::Session`] explicitly, leases
//! the user key at the start, and re-checks the lease between steps.

pub mod engine;

pub use engine::{
    delete_file, download_file, fetch_file, publish, resolve_record, save_record, upload_bytes,
    upload_file, DownloadResult, ProgressFn, UploadResult,
};
