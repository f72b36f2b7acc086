//! End-to-end tests of the transfer pipelines on an in-memory OpenDAL store.
//!
//! Verifies that files survive upload → download unchanged, that identical
//! content is stored once while each upload keeps its own record, that
//! envelopes stay private to the signing user unless published, that
//! independent transfers run concurrently, and that sign-out stops in-flight
//! work.

use std::path::Path;

use secrecy::SecretString;
use tempfile::TempDir;

use cidlock_crypto::{CryptoError, PlaintextFile, RetrievalMode, Session};
use cidlock_storage::{build_memory_operator, EnvelopeBackend, OperatorBackend, StorageError};
use cidlock_transfer::engine;

fn memory_backend() -> OperatorBackend {
    OperatorBackend::new(build_memory_operator().expect("memory operator"), "test")
}

fn session(signature: &str) -> Session {
    Session::new(SecretString::from(signature))
}

fn write_test_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

fn crypto_error(err: &anyhow::Error) -> Option<&CryptoError> {
    err.downcast_ref::<CryptoError>()
}

#[tokio::test]
async fn upload_download_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let backend = memory_backend();
    let session = session("0xSIG");

    let original = b"hello encrypted world! this file is encrypted, uploaded, \
                     downloaded, decrypted, and verified for integrity.";
    let src = write_test_file(tmp.path(), "secret.txt", original);

    let upload = engine::upload_file(&backend, &session, &src, Some("text/plain"), None)
        .await
        .expect("upload should succeed");

    assert_eq!(upload.bytes, original.len() as u64);
    assert_eq!(upload.key, upload.record.cid_of_encrypted_buffer_str);
    assert!(!upload.deduplicated);

    let out_dir = tmp.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let download = engine::download_file(
        &backend,
        &session,
        &upload.record,
        &out_dir,
        RetrievalMode::Original,
    )
    .await
    .expect("download should succeed");

    assert_eq!(download.local_path, out_dir.join("secret.txt"));
    assert_eq!(download.metadata.name, "secret.txt");
    assert_eq!(download.metadata.mime_type, "text/plain");
    assert!(download.metadata.last_modified.is_some());
    assert_eq!(std::fs::read(&download.local_path).unwrap(), original);
}

#[tokio::test]
async fn hello_scenario_through_backend() {
    let backend = memory_backend();
    let session = session("0xSIG");

    let file = PlaintextFile::new(b"hello".to_vec(), "a.txt", "text/plain");
    let upload = engine::upload_bytes(&backend, &session, file.clone(), None)
        .await
        .unwrap();

    // Record looked up by storage key, as the CLI does for a bare CID
    let record = engine::resolve_record(&backend, &session, &upload.key)
        .await
        .unwrap();
    assert_eq!(record, upload.record);
    let fetched = engine::fetch_file(&backend, &session, &record, RetrievalMode::Original)
        .await
        .unwrap();

    assert_eq!(fetched, file);
}

#[tokio::test]
async fn identical_content_deduplicated_across_users() {
    let backend = memory_backend();
    let alice = session("0xALICE");
    let bob = session("0xBOB");

    let data = b"shared payload".to_vec();
    let a = engine::upload_bytes(
        &backend,
        &alice,
        PlaintextFile::new(data.clone(), "a.bin", "application/octet-stream"),
        None,
    )
    .await
    .unwrap();
    let b = engine::upload_bytes(
        &backend,
        &bob,
        PlaintextFile::new(data, "b.bin", "application/octet-stream"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(a.key, b.key, "same bytes, same storage key");
    assert!(b.deduplicated);
    assert_ne!(a.record.iv_string, b.record.iv_string);
    assert_ne!(a.record.id, b.record.id);

    // Looking the CID up finds each user's own record, not the latest one
    let for_alice = engine::resolve_record(&backend, &alice, &a.key).await.unwrap();
    let for_bob = engine::resolve_record(&backend, &bob, &b.key).await.unwrap();
    assert_eq!(for_alice, a.record);
    assert_eq!(for_bob, b.record);

    let file = engine::fetch_file(&backend, &alice, &for_alice, RetrievalMode::Original)
        .await
        .unwrap();
    assert_eq!(file.metadata.name, "a.bin");
}

#[tokio::test]
async fn deleting_one_upload_keeps_shared_ciphertext() {
    let tmp = TempDir::new().unwrap();
    let backend = memory_backend();
    let alice = session("0xALICE");
    let bob = session("0xBOB");

    let data = b"both of us keep this".to_vec();
    let a = engine::upload_bytes(
        &backend,
        &alice,
        PlaintextFile::new(data.clone(), "mine.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();
    let b = engine::upload_bytes(
        &backend,
        &bob,
        PlaintextFile::new(data.clone(), "theirs.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(a.key, b.key);

    engine::delete_file(&backend, &b.record).await.unwrap();

    let record = engine::resolve_record(&backend, &alice, &a.key).await.unwrap();
    let download = engine::download_file(
        &backend,
        &alice,
        &record,
        tmp.path(),
        RetrievalMode::Original,
    )
    .await
    .expect("alice's upload survives bob's delete");
    assert_eq!(download.metadata.name, "mine.txt");
    assert_eq!(std::fs::read(&download.local_path).unwrap(), data);

    // Bob's record is gone, so the CID no longer resolves for him
    let err = engine::resolve_record(&backend, &bob, &b.key).await.unwrap_err();
    assert!(
        matches!(crypto_error(&err), Some(CryptoError::DecryptionFailed)),
        "got {err:#}"
    );

    // The last delete takes the ciphertext with it
    engine::delete_file(&backend, &a.record).await.unwrap();
    let err = backend.fetch_ciphertext(&a.key).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn same_user_same_bytes_keeps_both_names() {
    let backend = memory_backend();
    let session = session("0xSIG");

    let first = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"dup".to_vec(), "first.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();
    let second = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"dup".to_vec(), "second.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(first.key, second.key);

    for (upload, name) in [(&first, "first.txt"), (&second, "second.txt")] {
        let file = engine::fetch_file(&backend, &session, &upload.record, RetrievalMode::Original)
            .await
            .unwrap();
        assert_eq!(file.metadata.name, name);
    }

    engine::delete_file(&backend, &first.record).await.unwrap();
    let file = engine::fetch_file(&backend, &session, &second.record, RetrievalMode::Original)
        .await
        .unwrap();
    assert_eq!(file.bytes, b"dup");
}

#[tokio::test]
async fn independent_transfers_run_concurrently() {
    let tmp = TempDir::new().unwrap();
    let backend = std::sync::Arc::new(memory_backend());
    let session = std::sync::Arc::new(session("0xSIG"));

    let mut handles = Vec::new();
    for i in 0..8usize {
        let backend = backend.clone();
        let session = session.clone();
        // Same stem, different extensions, all written into one directory
        let name = format!("report.{i}");
        let dest = tmp.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            let content = vec![i as u8; 1024 * (i + 1)];
            let upload = engine::upload_bytes(
                backend.as_ref(),
                &session,
                PlaintextFile::new(content.clone(), name.clone(), "application/octet-stream"),
                None,
            )
            .await
            .unwrap();
            let download = engine::download_file(
                backend.as_ref(),
                &session,
                &upload.record,
                &dest,
                RetrievalMode::Original,
            )
            .await
            .unwrap();
            (name, content, download)
        }));
    }

    for handle in handles {
        let (name, content, download) = handle.await.unwrap();
        assert_eq!(download.local_path, tmp.path().join(&name));
        assert_eq!(std::fs::read(&download.local_path).unwrap(), content);
    }
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 8, "no temp files left");
}

#[tokio::test]
async fn other_user_cannot_decrypt() {
    let backend = memory_backend();
    let owner = session("0xSIG-A");
    let intruder = session("0xSIG-B");

    let upload = engine::upload_bytes(
        &backend,
        &owner,
        PlaintextFile::new(b"private".to_vec(), "p.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();

    let err = engine::fetch_file(&backend, &intruder, &upload.record, RetrievalMode::Original)
        .await
        .unwrap_err();
    assert!(
        matches!(crypto_error(&err), Some(CryptoError::DecryptionFailed)),
        "got {err:#}"
    );
}

#[tokio::test]
async fn signed_out_session_is_refused() {
    let backend = memory_backend();
    let session = session("0xSIG");
    let upload = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"x".to_vec(), "x", "text/plain"),
        None,
    )
    .await
    .unwrap();

    session.sign_out();

    let err = engine::fetch_file(&backend, &session, &upload.record, RetrievalMode::Original)
        .await
        .unwrap_err();
    assert!(matches!(crypto_error(&err), Some(CryptoError::MissingSecret)));

    let err = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"y".to_vec(), "y", "text/plain"),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(crypto_error(&err), Some(CryptoError::MissingSecret)));
}

#[tokio::test]
async fn sign_out_during_upload_aborts() {
    let backend = memory_backend();
    let session = std::sync::Arc::new(session("0xSIG"));

    // Sign out from the progress callback once encryption has started
    let for_cb = session.clone();
    let progress: engine::ProgressFn = Box::new(move |_, _, msg| {
        if msg == "encrypting" {
            for_cb.sign_out();
        }
    });

    let err = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"in flight".to_vec(), "f", "text/plain"),
        Some(&progress),
    )
    .await
    .unwrap_err();
    assert!(matches!(crypto_error(&err), Some(CryptoError::MissingSecret)));

    // The ciphertext depends on content only, so any key finds its storage CID
    let same_content = cidlock_crypto::encrypt(
        &PlaintextFile::new(b"in flight".to_vec(), "f", "text/plain"),
        &cidlock_crypto::UserKey::from_bytes([0u8; 32]),
    )
    .unwrap();
    let err = backend
        .fetch_ciphertext(&same_content.cid_of_encrypted_buffer_str)
        .await
        .unwrap_err();
    assert!(
        matches!(err, StorageError::NotFound(_)),
        "nothing reaches the backend after sign-out"
    );
}

#[tokio::test]
async fn publish_enables_public_retrieval() {
    let tmp = TempDir::new().unwrap();
    let backend = memory_backend();
    let owner = session("0xSIG");
    let reader = session("0xSOMEONE-ELSE");

    let upload = engine::upload_bytes(
        &backend,
        &owner,
        PlaintextFile::new(b"shareable".to_vec(), "s.txt", "text/plain"),
        None,
    )
    .await
    .unwrap();

    let public = engine::publish(&owner, &upload.record).await.unwrap();
    assert!(public.is_public());

    let record_path = tmp.path().join("s.public.json");
    engine::save_record(&public, &record_path).await.unwrap();
    let loaded = engine::resolve_record(&backend, &reader, record_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(loaded, public);

    // A different user opens the published record, metadata included
    let file = engine::fetch_file(&backend, &reader, &loaded, RetrievalMode::Public)
        .await
        .unwrap();
    assert_eq!(file.bytes, b"shareable");
    assert_eq!(file.metadata.name, "s.txt");

    // ...but the owner-only identifier in the same record stays closed to them
    let err = engine::fetch_file(&backend, &reader, &loaded, RetrievalMode::Original)
        .await
        .unwrap_err();
    assert!(matches!(crypto_error(&err), Some(CryptoError::DecryptionFailed)));

    // Non-owners cannot publish someone else's upload
    let err = engine::publish(&reader, &upload.record).await.unwrap_err();
    assert!(matches!(crypto_error(&err), Some(CryptoError::DecryptionFailed)));

    // An unpublished record has no plaintext identifier to retrieve by
    let err = engine::fetch_file(&backend, &owner, &upload.record, RetrievalMode::Public)
        .await
        .unwrap_err();
    assert!(matches!(
        crypto_error(&err),
        Some(CryptoError::MalformedEnvelope(_))
    ));
}

#[tokio::test]
async fn delete_removes_envelope() {
    let backend = memory_backend();
    let session = session("0xSIG");
    let upload = engine::upload_bytes(
        &backend,
        &session,
        PlaintextFile::new(b"temporary".to_vec(), "t", "text/plain"),
        None,
    )
    .await
    .unwrap();

    engine::delete_file(&backend, &upload.record).await.unwrap();

    let err = engine::fetch_file(&backend, &session, &upload.record, RetrievalMode::Original)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let tmp = TempDir::new().unwrap();
    let backend = memory_backend();
    let owner = session("0xSIG-A");
    let intruder = session("0xSIG-B");

    let upload = engine::upload_bytes(
        &backend,
        &owner,
        PlaintextFile::new(b"secret".to_vec(), "s", "text/plain"),
        None,
    )
    .await
    .unwrap();

    let dest = tmp.path().join("s.out");
    let result = engine::download_file(
        &backend,
        &intruder,
        &upload.record,
        &dest,
        RetrievalMode::Original,
    )
    .await;

    assert!(result.is_err());
    assert!(!dest.exists());
}

#[tokio::test]
async fn resolve_rejects_garbage() {
    let backend = memory_backend();
    let session = session("0xSIG");
    assert!(engine::resolve_record(&backend, &session, "not-a-cid-or-file")
        .await
        .is_err());
}
