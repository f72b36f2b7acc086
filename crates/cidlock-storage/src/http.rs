//! HTTP file API backend
//!
//! Endpoints, relative to `base_url`:
//!
//! | operation          | request                                   |
//! |--------------------|-------------------------------------------|
//! | upload             | `POST /api/file/upload` (multipart form)  |
//! | fetch ciphertext   | `GET /api/file/{cid}`                     |
//! | delete             | `DELETE /api/file/{id}`                   |
//!
//! The upload response names the server's record for that upload (`ID`);
//! deletes address that record, not the blob, which other uploads may share.
//! The API does not serve envelope records; callers keep the record they
//! got back from the upload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use cidlock_core::config::HttpConfig;
use cidlock_crypto::{EncryptedEnvelope, EnvelopeRecord};

use crate::backend::{
    require_record_id, validate_key, verify_ciphertext, EnvelopeBackend, UploadReceipt,
};
use crate::error::{StorageError, StorageResult};
use crate::operator::check_endpoint_tls;

pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build from the `[http]` config section. The bearer token is read from
    /// the environment variable named by `token_env`, if set.
    pub fn from_config(cfg: &HttpConfig, enforce_tls: bool) -> anyhow::Result<Self> {
        check_endpoint_tls("HTTP backend", &cfg.base_url, enforce_tls)?;

        let token = std::env::var(&cfg.token_env).ok().map(SecretString::from);
        if token.is_none() {
            debug!(
                token_env = %cfg.token_env,
                "no bearer token in environment, sending unauthenticated requests"
            );
        }

        Ok(Self::new(
            &cfg.base_url,
            token,
            Duration::from_secs(cfg.timeout_secs),
        )?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn file_url(&self, key: &str) -> String {
        format!("{}/api/file/{key}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

/// Body of a successful upload. Only the record id is used.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "ID", alias = "id", default)]
    id: Option<serde_json::Value>,
}

/// The server's record id from an upload response body, if it has one.
fn parse_record_id(body: &[u8]) -> Option<String> {
    let response: UploadResponse = serde_json::from_slice(body).ok()?;
    match response.id? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Server record ids are spliced into a URL path.
fn validate_record_id(id: &str) -> StorageResult<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(id.to_string()))
    }
}

/// Turn a non-2xx response into a StorageError.
fn check_status(method: &'static str, url: &str, resp: Response) -> StorageResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(url.to_string()));
    }
    Err(StorageError::Status {
        method,
        url: url.to_string(),
        status: status.as_u16(),
    })
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl EnvelopeBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn upload(&self, envelope: &EncryptedEnvelope) -> StorageResult<UploadReceipt> {
        let key = validate_key(&envelope.cid_of_encrypted_buffer_str)?;
        let url = format!("{}/api/file/upload", self.base_url);

        let blob = Part::bytes(envelope.encrypted_file_blob.clone()).file_name(key.to_string());
        let form = Form::new()
            .part("encryptedFileBlob", blob)
            .text("encryptedMetadataStr", envelope.encrypted_metadata_str.clone())
            .text("ivString", envelope.iv_string.clone())
            .text(
                "cidOfEncryptedBufferStr",
                envelope.cid_of_encrypted_buffer_str.clone(),
            )
            .text(
                "cidEncryptedOriginalStr",
                envelope.cid_encrypted_original_str.clone(),
            );

        let resp = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;
        let body = check_status("POST", &url, resp)?.bytes().await?;

        let record_id = parse_record_id(&body);
        if record_id.is_none() {
            warn!(key = %key, "upload response carried no record ID; this upload cannot be deleted by record");
        }

        let bytes_stored = envelope.encrypted_file_blob.len() as u64;
        info!(key = %key, record = ?record_id, bytes = bytes_stored, "envelope uploaded");

        Ok(UploadReceipt {
            key: key.into_inner(),
            record_id,
            bytes_stored,
            deduplicated: false,
        })
    }

    async fn fetch_ciphertext(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let url = self.file_url(key);

        let resp = self.authorized(self.client.get(&url)).send().await?;
        let bytes = check_status("GET", &url, resp)?.bytes().await?.to_vec();
        verify_ciphertext(key, &bytes, &url)?;

        debug!(key, bytes = bytes.len(), "fetched ciphertext");
        Ok(bytes)
    }

    async fn fetch_records(&self, _key: &str) -> StorageResult<Vec<EnvelopeRecord>> {
        Err(StorageError::Unsupported {
            operation: "fetching envelope records",
            backend: "http",
        })
    }

    async fn delete(&self, record: &EnvelopeRecord) -> StorageResult<()> {
        let key = validate_key(&record.cid_of_encrypted_buffer_str)?;
        let id = require_record_id(record)?;
        validate_record_id(id)?;
        let url = self.file_url(id);

        let resp = self.authorized(self.client.delete(&url)).send().await?;
        check_status("DELETE", &url, resp)?;

        info!(key = %key, record = id, "envelope deleted");
        Ok(())
    }

    async fn health(&self) -> StorageResult<()> {
        let url = format!("{}/", self.base_url);
        let resp = self.authorized(self.client.get(&url)).send().await?;
        let status = resp.status();
        // Up means reachable and accepting our credentials; other 4xx still count.
        let rejected = status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN;
        if status.is_server_error() || rejected {
            return Err(StorageError::Status {
                method: "GET",
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
