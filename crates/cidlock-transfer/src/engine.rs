//! Transfer engine: envelope pipelines over an [`EnvelopeBackend`]
//!
//! - `upload_file` / `upload_bytes`: read → encrypt → upload
//! - `fetch_file`: fetch ciphertext → decrypt (for viewing)
//! - `download_file`: `fetch_file` → atomic write to a local path
//! - `publish`: derive the shareable record of an owned envelope
//! - `delete_file`: remove one uploaded envelope from the backend
//! - `resolve_record`: load a record from a saved JSON file or the backend
//!
//! Crypto steps run on the blocking pool. Each pipeline leases the session's
//! user key when it starts and re-validates the lease after every step, so
//! signing out makes in-flight work stop with `CryptoError::MissingSecret`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info};

use cidlock_crypto::{
    decrypt, encrypt, publish_record, unwrap_content_id, ContentId, CryptoError, EnvelopeRecord,
    FileMetadata, PlaintextFile, RetrievalMode, Session,
};
use cidlock_storage::EnvelopeBackend;

/// Progress callback type (step_done, steps_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Content type used when the caller does not supply one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Result of uploading a single file
#[derive(Debug)]
pub struct UploadResult {
    /// Record to keep for later retrieval and deletion (carries the backend id)
    pub record: EnvelopeRecord,
    /// Storage key (`cidOfEncryptedBufferStr`)
    pub key: String,
    /// Plaintext size
    pub bytes: u64,
    /// Wall time spent in `encrypt`
    pub encryption_time: Duration,
    /// true if the backend already held this ciphertext
    pub deduplicated: bool,
}

/// Result of downloading a single file
#[derive(Debug)]
pub struct DownloadResult {
    pub key: String,
    pub local_path: PathBuf,
    pub bytes: u64,
    pub metadata: FileMetadata,
}

fn report(progress: Option<&ProgressFn>, step: u64, total: u64, msg: &str) {
    if let Some(cb) = progress {
        cb(step, total, msg);
    }
}

/// Encrypt a local file and upload its envelope.
///
/// Metadata comes from the file itself: name, size and mtime.
/// `content_type` defaults to [`DEFAULT_CONTENT_TYPE`].
pub async fn upload_file(
    backend: &dyn EnvelopeBackend,
    session: &Session,
    local_path: &Path,
    content_type: Option<&str>,
    progress: Option<&ProgressFn>,
) -> Result<UploadResult> {
    report(progress, 0, 3, "reading");
    let bytes = tokio::fs::read(local_path)
        .await
        .with_context(|| format!("reading: {}", local_path.display()))?;

    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("no file name in path: {}", local_path.display()))?;

    let mut file = PlaintextFile::new(bytes, name, content_type.unwrap_or(DEFAULT_CONTENT_TYPE));
    file.metadata.last_modified = tokio::fs::metadata(local_path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64);

    debug!(path = %local_path.display(), bytes = file.bytes.len(), "read local file");
    upload_bytes(backend, session, file, progress).await
}

/// Encrypt an in-memory file and upload its envelope.
pub async fn upload_bytes(
    backend: &dyn EnvelopeBackend,
    session: &Session,
    file: PlaintextFile,
    progress: Option<&ProgressFn>,
) -> Result<UploadResult> {
    let lease = session.lease()?;
    let user_key = lease.user_key().clone();
    let bytes = file.bytes.len() as u64;

    report(progress, 1, 3, "encrypting");
    let started = Instant::now();
    let envelope = tokio::task::spawn_blocking(move || encrypt(&file, &user_key))
        .await
        .context("encryption task failed")??;
    let encryption_time = started.elapsed();
    debug!(
        key = %envelope.cid_of_encrypted_buffer_str,
        ms = encryption_time.as_millis() as u64,
        "encrypted"
    );

    lease.ensure_valid(session)?;

    report(progress, 2, 3, "uploading");
    let receipt = backend
        .upload(&envelope)
        .await
        .with_context(|| format!("uploading to {} backend", backend.name()))?;

    report(progress, 3, 3, "done");
    info!(
        key = %receipt.key,
        record = ?receipt.record_id,
        bytes,
        deduplicated = receipt.deduplicated,
        "uploaded"
    );

    let mut record = envelope.record();
    record.id = receipt.record_id;

    Ok(UploadResult {
        record,
        key: receipt.key,
        bytes,
        encryption_time,
        deduplicated: receipt.deduplicated,
    })
}

/// Fetch the ciphertext a record points at and decrypt it.
///
/// Nothing is returned unless every step succeeds under the same sign-in.
/// Public records open for any signed-in user.
pub async fn fetch_file(
    backend: &dyn EnvelopeBackend,
    session: &Session,
    record: &EnvelopeRecord,
    mode: RetrievalMode,
) -> Result<PlaintextFile> {
    let lease = session.lease()?;
    let key = record.cid_of_encrypted_buffer_str.clone();

    let ciphertext = backend
        .fetch_ciphertext(&key)
        .await
        .with_context(|| format!("fetching ciphertext {key}"))?;
    debug!(key = %key, bytes = ciphertext.len(), "fetched");

    lease.ensure_valid(session)?;

    let user_key = lease.user_key().clone();
    let owned_record = record.clone();
    let file = tokio::task::spawn_blocking(move || {
        decrypt(&owned_record, &user_key, &ciphertext, mode)
    })
    .await
    .context("decryption task failed")??;

    lease.ensure_valid(session)?;
    debug!(key = %key, mode = %mode, bytes = file.bytes.len(), "decrypted");
    Ok(file)
}

/// Fetch, decrypt and atomically write a file.
///
/// If `dest` is an existing directory, the file is written inside it under
/// the name recorded in its metadata.
pub async fn download_file(
    backend: &dyn EnvelopeBackend,
    session: &Session,
    record: &EnvelopeRecord,
    dest: &Path,
    mode: RetrievalMode,
) -> Result<DownloadResult> {
    let file = fetch_file(backend, session, record, mode).await?;
    let key = record.cid_of_encrypted_buffer_str.clone();

    let dest_is_dir = tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let local_path = if dest_is_dir {
        dest.join(safe_file_name(&file.metadata.name, &key))
    } else {
        dest.to_path_buf()
    };

    let bytes = file.bytes.len() as u64;
    write_atomic(&local_path, file.bytes).await?;

    info!(
        key = %key,
        local = %local_path.display(),
        bytes,
        "downloaded"
    );

    Ok(DownloadResult {
        key,
        local_path,
        bytes,
        metadata: file.metadata,
    })
}

/// Produce the public form of a record owned by the session's user.
pub async fn publish(session: &Session, record: &EnvelopeRecord) -> Result<EnvelopeRecord> {
    let lease = session.lease()?;
    let public = publish_record(record, lease.user_key())?;
    lease.ensure_valid(session)?;

    info!(key = %public.cid_of_encrypted_buffer_str, "published");
    Ok(public)
}

/// Remove the upload a record describes.
///
/// The record must carry the backend id it got at upload. The ciphertext is
/// kept while other uploads still reference it.
pub async fn delete_file(backend: &dyn EnvelopeBackend, record: &EnvelopeRecord) -> Result<()> {
    let key = &record.cid_of_encrypted_buffer_str;
    backend
        .delete(record)
        .await
        .with_context(|| format!("deleting {key} from {} backend", backend.name()))
}

/// Load a record from `target`: a path to a saved record JSON, or a storage
/// CID to look up on the backend.
///
/// A CID can have several uploads behind it; the one whose wrapped
/// identifier opens under the session's key is returned.
pub async fn resolve_record(
    backend: &dyn EnvelopeBackend,
    session: &Session,
    target: &str,
) -> Result<EnvelopeRecord> {
    let path = Path::new(target);
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if is_file {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading record: {}", path.display()))?;
        let record = EnvelopeRecord::from_bytes(&raw)
            .with_context(|| format!("parsing record: {}", path.display()))?;
        return Ok(record);
    }

    let key = ContentId::parse(target)
        .with_context(|| format!("{target:?} is neither a record file nor a storage CID"))?;
    let lease = session.lease()?;
    let records = backend.fetch_records(key.as_str()).await.with_context(|| {
        format!(
            "looking up records for {key} on the {} backend (pass the record file saved at upload instead)",
            backend.name()
        )
    })?;
    lease.ensure_valid(session)?;

    let total = records.len();
    let owned = records
        .into_iter()
        .find(|record| unwrap_content_id(record, lease.user_key()).is_ok());
    match owned {
        Some(record) => {
            debug!(key = %key, candidates = total, "resolved owned record");
            Ok(record)
        }
        None => Err(anyhow::Error::new(CryptoError::DecryptionFailed)
            .context(format!("none of the {total} records for {key} belong to the signed-in user"))),
    }
}

/// Atomically write a record as pretty JSON.
pub async fn save_record(record: &EnvelopeRecord, path: &Path) -> Result<()> {
    let json = record.to_bytes()?;
    write_atomic(path, json).await
}

/// Write via a uniquely named temp file in the target directory + rename, so
/// a failure never leaves a partial file and concurrent writes never share a
/// temp file.
async fn write_atomic(path: &Path, data: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".cidlock-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .with_context(|| format!("creating tmp in: {}", parent.display()))?;
        tmp.write_all(&data)
            .with_context(|| format!("writing tmp: {}", tmp.path().display()))?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("renaming to: {}", path.display()))?;
        Ok(())
    })
    .await
    .context("write task failed")?
}

/// Last path component of a recorded name; never escapes the target dir.
fn safe_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("a.txt", "k"), "a.txt");
        assert_eq!(safe_file_name("../../etc/passwd", "k"), "passwd");
        assert_eq!(safe_file_name("", "k"), "k");
        assert_eq!(safe_file_name("..", "k"), "k");
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.bin");

        write_atomic(&path, b"data".to_vec()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert_eq!(dir_entries(&dir.path().join("nested")), vec!["out.bin"]);
    }

    #[tokio::test]
    async fn test_write_atomic_same_stem_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("a.txt");
        let md = dir.path().join("a.md");

        let mut handles = Vec::new();
        for round in 0..20u8 {
            let (txt, md) = (txt.clone(), md.clone());
            handles.push(tokio::spawn(async move {
                let (a, b) = tokio::join!(
                    write_atomic(&txt, vec![b't'; 4096 + round as usize]),
                    write_atomic(&md, vec![b'm'; 2048 + round as usize]),
                );
                a.unwrap();
                b.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(std::fs::read(&txt).unwrap().iter().all(|&c| c == b't'));
        assert!(std::fs::read(&md).unwrap().iter().all(|&c| c == b'm'));
        assert_eq!(dir_entries(dir.path()), vec!["a.md", "a.txt"]);
    }
}
