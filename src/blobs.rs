// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Storage provider client.
//!
//! Only the authorization and deletion contract of the provider matters
//! here; uploads themselves go browser-to-provider. Deletes are
//! idempotent on the provider side, so removing an already-removed object
//! is not an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Errors from the storage provider API.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage provider returned status {0}")]
    Status(u16),
}

/// Deletion and listing against the storage provider.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Delete the object at `url`.
    async fn delete(&self, url: &str) -> Result<(), BlobError>;

    /// URLs of every object in the bucket.
    async fn list(&self) -> Result<Vec<String>, BlobError>;
}

/// Whether `url` points at the trusted storage host.
///
/// Accepts the host itself and its subdomains, nothing else. Anything
/// that fails to parse is untrusted.
pub fn is_trusted_blob_url(url: &str, storage_host: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => {
                host == storage_host || host.ends_with(&format!(".{storage_host}"))
            }
            None => false,
        },
        Err(_) => false,
    }
}

/// HTTP client for the blob provider API.
pub struct HttpBlobClient {
    http: reqwest::Client,
    api: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    blobs: Vec<ListedBlob>,
}

#[derive(Debug, Deserialize)]
struct ListedBlob {
    url: String,
}

impl HttpBlobClient {
    pub fn new(api: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api: api.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobClient {
    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let response = self
            .http
            .post(format!("{}/delete", self.api))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BlobError> {
        let response = self
            .http
            .get(&self.api)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::Status(response.status().as_u16()));
        }

        let body: ListResponse = response.json().await?;
        Ok(body.blobs.into_iter().map(|b| b.url).collect())
    }
}

/// In-process blob store for the test suites.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<Vec<String>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    /// Deletes for URLs containing this substring fail, for exercising
    /// partial-failure reporting
    fail_on: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(substring: impl Into<String>) -> Self {
        Self {
            fail_on: Some(substring.into()),
            ..Default::default()
        }
    }

    pub async fn seed(&self, urls: &[&str]) {
        let mut objects = self.objects.write().await;
        objects.extend(urls.iter().map(|u| u.to_string()));
    }

    pub async fn deleted_urls(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    pub async fn remaining(&self) -> Vec<String> {
        self.objects.read().await.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        if let Some(fail_on) = &self.fail_on {
            if url.contains(fail_on.as_str()) {
                return Err(BlobError::Status(500));
            }
        }
        self.objects.write().await.retain(|u| u != url);
        self.deleted.write().await.push(url.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BlobError> {
        Ok(self.objects.read().await.clone())
    }
}
