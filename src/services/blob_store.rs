//! Remote object store client.
//!
//! Thin transport adapter: plain HTTP GET/PUT with header-based auth.
//! The trait is the seam the pipeline depends on, so tests can run the
//! whole pipeline against a directory-backed double. The shared
//! `reqwest::Client` connection pool is safe for concurrent use by
//! every in-flight object.

use crate::models::report::ReportMetaData;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use futures::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::{HeaderName, HeaderValue};
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Auth header the store expects on every request.
pub const API_KEY_HEADER: &str = "ocp-apim-subscription-key";

pub const CHUNK_INDEX_HEADER: &str = "x-chunk-index";
pub const CHUNK_TOTAL_HEADER: &str = "x-chunk-total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{name}` not found in container `{container}`")]
    NotFound { container: String, name: String },
    /// The store answered with a status outside the operation's
    /// success contract. There is no partial-write recovery.
    #[error("{operation} of `{name}` answered {status}")]
    UnexpectedStatus {
        operation: &'static str,
        name: String,
        status: StatusCode,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object and write its bytes to `dest`. Returns the
    /// number of bytes written.
    async fn download(&self, container: &str, name: &str, dest: &Path)
    -> Result<u64, StoreError>;

    /// Upload a local file as an object. Succeeds only on an exact
    /// "created" answer.
    async fn upload(
        &self,
        container: &str,
        name: &str,
        src: &Path,
        chunk_index: usize,
        chunk_total: usize,
    ) -> Result<(), StoreError>;

    /// Attach the report snapshot to an uploaded object as key/value
    /// headers. Same success contract as `upload`.
    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        report: &ReportMetaData,
    ) -> Result<(), StoreError>;
}

/// HTTP implementation against the remote store.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!("{}/{}/{}", self.base_url, container, name)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(
        &self,
        container: &str,
        name: &str,
        dest: &Path,
    ) -> Result<u64, StoreError> {
        let response = self
            .client
            .get(self.object_url(container, name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "download",
                name: name.to_string(),
                status: response.status(),
            });
        }

        // Stream straight to disk; payloads can be large.
        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = StreamReader::new(stream);
        let mut file = File::create(dest).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        tracing::debug!(container, name, bytes = written, "downloaded object");
        Ok(written)
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        src: &Path,
        chunk_index: usize,
        chunk_total: usize,
    ) -> Result<(), StoreError> {
        // Chunks are threshold-bounded, so one read is acceptable and
        // lets us send a content digest alongside the payload.
        let body = tokio::fs::read(src).await?;
        let digest = general_purpose::STANDARD.encode(md5::compute(&body).0);

        let response = self
            .client
            .put(self.object_url(container, name))
            .header(API_KEY_HEADER, &self.api_key)
            .header("content-md5", digest)
            .header(CHUNK_INDEX_HEADER, chunk_index.to_string())
            .header(CHUNK_TOTAL_HEADER, chunk_total.to_string())
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(StoreError::UnexpectedStatus {
                operation: "upload",
                name: name.to_string(),
                status: response.status(),
            });
        }
        tracing::debug!(container, name, chunk_index, chunk_total, "uploaded chunk");
        Ok(())
    }

    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        report: &ReportMetaData,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put(format!("{}?comp=metadata", self.object_url(container, name)))
            .header(API_KEY_HEADER, &self.api_key);
        for (key, value) in report.to_headers() {
            if let (Ok(header), Ok(header_value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                request = request.header(header, header_value);
            }
        }

        let response = request.send().await?;
        if response.status() != StatusCode::CREATED {
            return Err(StoreError::UnexpectedStatus {
                operation: "set_metadata",
                name: name.to_string(),
                status: response.status(),
            });
        }
        tracing::debug!(container, name, "attached report metadata");
        Ok(())
    }
}
