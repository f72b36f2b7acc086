//! The envelope backend seam and its OpenDAL implementation
//!
//! Object layout under the configured prefix:
//!
//! ```text
//! {prefix}/blobs/{cid}                  ciphertext, raw bytes
//! {prefix}/envelopes/{cid}/{id}.json    EnvelopeRecord JSON, one per upload
//! ```
//!
//! `{cid}` is always `cidOfEncryptedBufferStr`, the CID of the ciphertext.
//! Convergent encryption means many uploads (by one user or several) can
//! land on the same blob; each keeps its own record, and the blob is removed
//! with the last record that references it.

use anyhow::Context;
use async_trait::async_trait;
use opendal::Operator;
use tracing::{debug, info};

use cidlock_core::config::{expand_tilde, BackendKind, CidlockConfig};
use cidlock_crypto::{compute_cid, ContentId, EncryptedEnvelope, EnvelopeRecord};

use crate::error::{StorageError, StorageResult};
use crate::health::check_health;
use crate::http::HttpBackend;
use crate::operator::{build_from_core_config, build_fs_operator, build_memory_operator};

/// What a backend reports after accepting an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Storage key (`cidOfEncryptedBufferStr`)
    pub key: String,
    /// Backend id of the stored record; needed to delete this upload later
    pub record_id: Option<String>,
    /// Ciphertext bytes sent to the store (0 when deduplicated)
    pub bytes_stored: u64,
    /// True if the blob was already present and was not rewritten
    pub deduplicated: bool,
}

/// A store for encrypted envelopes, keyed by the ciphertext CID.
#[async_trait]
pub trait EnvelopeBackend: Send + Sync {
    /// Short name for logs and error messages
    fn name(&self) -> &'static str;

    /// Store the blob (unless already present) and a new record for it.
    async fn upload(&self, envelope: &EncryptedEnvelope) -> StorageResult<UploadReceipt>;

    /// Fetch the ciphertext stored under `key`.
    async fn fetch_ciphertext(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Every record stored against the blob `key`, one per upload.
    async fn fetch_records(&self, key: &str) -> StorageResult<Vec<EnvelopeRecord>>;

    /// Remove the upload named by `record.id`.
    async fn delete(&self, record: &EnvelopeRecord) -> StorageResult<()>;

    /// Cheap reachability check.
    async fn health(&self) -> StorageResult<()>;
}

/// Reject anything that is not a ciphertext CID before it becomes a path.
pub(crate) fn validate_key(key: &str) -> StorageResult<ContentId> {
    ContentId::parse(key).map_err(|_| StorageError::InvalidKey(key.to_string()))
}

/// Check fetched ciphertext against the CID it was stored under.
pub(crate) fn verify_ciphertext(key: &str, bytes: &[u8], path: &str) -> StorageResult<()> {
    let actual = compute_cid(bytes);
    if actual.as_str() != key {
        return Err(StorageError::Corrupt {
            path: path.to_string(),
            reason: format!("content hashes to {actual}"),
        });
    }
    Ok(())
}

/// The backend id a record must carry to be deleted.
pub(crate) fn require_record_id(record: &EnvelopeRecord) -> StorageResult<&str> {
    record
        .id
        .as_deref()
        .ok_or_else(|| StorageError::MissingRecordId(record.cid_of_encrypted_buffer_str.clone()))
}

/// [`EnvelopeBackend`] over any OpenDAL operator
#[derive(Debug, Clone)]
pub struct OperatorBackend {
    op: Operator,
    prefix: String,
}

impl OperatorBackend {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self { op, prefix }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn join(&self, rest: &str) -> String {
        if self.prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{rest}", self.prefix)
        }
    }

    pub fn blob_path(&self, key: &ContentId) -> String {
        self.join(&format!("blobs/{key}"))
    }

    pub fn record_dir(&self, key: &ContentId) -> String {
        self.join(&format!("envelopes/{key}/"))
    }

    /// Record ids are CIDs of the record JSON, so they are path-safe.
    pub fn record_path(&self, key: &ContentId, id: &ContentId) -> String {
        format!("{}{id}.json", self.record_dir(key))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.op
            .exists(path)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))
    }

    /// Paths of the record files under `key`; empty if there are none.
    async fn record_paths(&self, key: &ContentId) -> StorageResult<Vec<String>> {
        let dir = self.record_dir(key);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Backend(e)),
        };
        Ok(entries
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| path.ends_with(".json"))
            .collect())
    }
}

#[async_trait]
impl EnvelopeBackend for OperatorBackend {
    fn name(&self) -> &'static str {
        "opendal"
    }

    async fn upload(&self, envelope: &EncryptedEnvelope) -> StorageResult<UploadReceipt> {
        let key = validate_key(&envelope.cid_of_encrypted_buffer_str)?;
        let blob_path = self.blob_path(&key);

        let deduplicated = self.exists(&blob_path).await?;
        let bytes_stored = if deduplicated {
            debug!(key = %key, "blob already stored, skipping write");
            0
        } else {
            self.op
                .write(&blob_path, envelope.encrypted_file_blob.clone())
                .await
                .map_err(|e| StorageError::from_opendal(&blob_path, e))?;
            envelope.encrypted_file_blob.len() as u64
        };

        // Each upload has a fresh IV, so the record JSON (and its CID) is unique.
        let mut record = envelope.record();
        let unnamed = record.to_bytes().map_err(|e| StorageError::Corrupt {
            path: self.record_dir(&key),
            reason: e.to_string(),
        })?;
        let id = compute_cid(&unnamed);
        record.id = Some(id.to_string());

        // The record goes in after the blob: a readable record implies a readable blob.
        let record_path = self.record_path(&key, &id);
        let record_json = record.to_bytes().map_err(|e| StorageError::Corrupt {
            path: record_path.clone(),
            reason: e.to_string(),
        })?;
        self.op
            .write(&record_path, record_json)
            .await
            .map_err(|e| StorageError::from_opendal(&record_path, e))?;

        info!(key = %key, record = %id, bytes = bytes_stored, deduplicated, "envelope stored");

        Ok(UploadReceipt {
            key: key.into_inner(),
            record_id: Some(id.into_inner()),
            bytes_stored,
            deduplicated,
        })
    }

    async fn fetch_ciphertext(&self, key: &str) -> StorageResult<Vec<u8>> {
        let cid = validate_key(key)?;
        let path = self.blob_path(&cid);

        let bytes = self
            .op
            .read(&path)
            .await
            .map_err(|e| StorageError::from_opendal(&path, e))?
            .to_vec();
        verify_ciphertext(key, &bytes, &path)?;

        debug!(key, bytes = bytes.len(), "fetched ciphertext");
        Ok(bytes)
    }

    async fn fetch_records(&self, key: &str) -> StorageResult<Vec<EnvelopeRecord>> {
        let cid = validate_key(key)?;
        let paths = self.record_paths(&cid).await?;
        if paths.is_empty() {
            return Err(StorageError::NotFound(self.record_dir(&cid)));
        }

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = self
                .op
                .read(&path)
                .await
                .map_err(|e| StorageError::from_opendal(&path, e))?
                .to_vec();
            let record = EnvelopeRecord::from_bytes(&raw).map_err(|e| StorageError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            if record.cid_of_encrypted_buffer_str != key {
                return Err(StorageError::Corrupt {
                    path,
                    reason: format!(
                        "record addresses {}, not {key}",
                        record.cid_of_encrypted_buffer_str
                    ),
                });
            }
            records.push(record);
        }
        debug!(key, records = records.len(), "fetched records");
        Ok(records)
    }

    async fn delete(&self, record: &EnvelopeRecord) -> StorageResult<()> {
        let key = validate_key(&record.cid_of_encrypted_buffer_str)?;
        let raw_id = require_record_id(record)?;
        let id = ContentId::parse(raw_id)
            .map_err(|_| StorageError::InvalidKey(raw_id.to_string()))?;
        let record_path = self.record_path(&key, &id);

        if !self.exists(&record_path).await? {
            return Err(StorageError::NotFound(record_path));
        }
        self.op
            .delete(&record_path)
            .await
            .map_err(|e| StorageError::from_opendal(&record_path, e))?;

        let remaining = self.record_paths(&key).await?.len();
        if remaining == 0 {
            let blob_path = self.blob_path(&key);
            self.op
                .delete(&blob_path)
                .await
                .map_err(|e| StorageError::from_opendal(&blob_path, e))?;
        }

        info!(key = %key, record = %id, remaining, "envelope deleted");
        Ok(())
    }

    async fn health(&self) -> StorageResult<()> {
        check_health(&self.op).await
    }
}

/// Build the backend selected by `config.backend.kind`.
///
/// S3 credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`;
/// the HTTP bearer token from the variable named by `http.token_env`.
pub fn open_backend(config: &CidlockConfig) -> anyhow::Result<Box<dyn EnvelopeBackend>> {
    let prefix = config.backend.prefix.clone();
    let backend: Box<dyn EnvelopeBackend> = match config.backend.kind {
        BackendKind::Fs => {
            let root = expand_tilde(&config.backend.root);
            std::fs::create_dir_all(&root)
                .with_context(|| format!("creating store root {}", root.display()))?;
            Box::new(OperatorBackend::new(build_fs_operator(&root)?, prefix))
        }
        BackendKind::S3 => {
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID must be set for the s3 backend")?;
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY must be set for the s3 backend")?;
            let op = build_from_core_config(&config.storage, &access_key_id, &secret_access_key)?;
            Box::new(OperatorBackend::new(op, prefix))
        }
        BackendKind::Memory => Box::new(OperatorBackend::new(build_memory_operator()?, prefix)),
        BackendKind::Http => Box::new(HttpBackend::from_config(
            &config.http,
            config.storage.enforce_tls,
        )?),
    };
    debug!(backend = backend.name(), "backend opened");
    Ok(backend)
}
