//! Remote object storage
//!
//! Persists prepared photo blobs and addresses them by public URL.
//! Deletion is best-effort: partial failure is tolerated and logged.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::time::Duration;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Contract the upload pipeline and cache need from object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob at `path`, returning its public URL
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Best-effort batch delete. Paths that fail to delete are logged
    /// and skipped; the call itself only fails on total breakdown.
    async fn delete(&self, paths: &[String]) -> Result<()>;

    /// Map a public URL produced by this store back to its object path.
    /// Returns None for URLs this store did not produce.
    fn object_path(&self, public_url: &str) -> Option<String>;
}

/// REST object storage client (Supabase-storage style API)
#[derive(Clone)]
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

impl HttpObjectStore {
    /// Create a client for `base_url` (e.g. "https://x.example.com/storage/v1")
    pub fn new(base_url: &str, bucket: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    /// Public URL for an object path
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        tracing::debug!("Uploading object: {} ({} bytes)", path, bytes.len());

        let response = self
            .http
            .post(self.upload_url(path))
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => {
                tracing::debug!("Object uploaded: {}", path);
                Ok(self.public_url(path))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EngineError::NotAuthenticated)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(EngineError::Upload(format!(
                    "object store returned {}: {}",
                    status, body
                )))
            }
        }
    }

    async fn delete(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let result = self
                .http
                .delete(self.upload_url(path))
                .bearer_auth(&self.api_key)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Deleted object: {}", path);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Failed to delete object {}: status {}",
                        path,
                        response.status()
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to delete object {}: {}", path, e);
                }
            }
        }

        Ok(())
    }

    fn object_path(&self, public_url: &str) -> Option<String> {
        let prefix = format!("{}/object/public/{}/", self.base_url, self.bucket);
        public_url
            .strip_prefix(&prefix)
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
    }
}
