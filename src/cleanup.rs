// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Compensating cleanup of uploaded objects.
//!
//! When a submission fails after its attachments were already uploaded,
//! the objects would otherwise be orphaned. The compensator deletes them
//! best-effort: each URL is checked against the trusted storage host
//! before any delete call is issued, and per-URL failures are reported,
//! never escalated to a whole-batch failure.

use crate::blobs::{is_trusted_blob_url, BlobStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-URL deletion outcome.
#[derive(Debug, Clone, Serialize)]
pub struct UrlOutcome {
    pub url: String,
    pub success: bool,
}

/// Result of a cleanup batch.
#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub total: usize,
    pub details: Vec<UrlOutcome>,
}

/// Deletes orphaned uploads from the storage provider.
#[derive(Clone)]
pub struct CleanupCompensator {
    store: Arc<dyn BlobStore>,
    trusted_host: String,
}

impl CleanupCompensator {
    pub fn new(store: Arc<dyn BlobStore>, trusted_host: impl Into<String>) -> Self {
        Self {
            store,
            trusted_host: trusted_host.into(),
        }
    }

    /// Delete the given object URLs.
    ///
    /// URLs outside the trusted storage host are marked failed without a
    /// delete call. An empty list short-circuits without touching the
    /// provider.
    pub async fn cleanup(&self, urls: &[String], correlation_id: Option<&str>) -> CleanupReport {
        if urls.is_empty() {
            return CleanupReport {
                deleted: 0,
                total: 0,
                details: Vec::new(),
            };
        }

        let mut details = Vec::with_capacity(urls.len());
        for url in urls {
            if !is_trusted_blob_url(url, &self.trusted_host) {
                warn!(correlation_id, url = %url, "refusing to delete untrusted url");
                details.push(UrlOutcome {
                    url: url.clone(),
                    success: false,
                });
                continue;
            }

            match self.store.delete(url).await {
                Ok(()) => details.push(UrlOutcome {
                    url: url.clone(),
                    success: true,
                }),
                Err(err) => {
                    warn!(correlation_id, url = %url, error = %err, "blob delete failed");
                    details.push(UrlOutcome {
                        url: url.clone(),
                        success: false,
                    });
                }
            }
        }

        let deleted = details.iter().filter(|d| d.success).count();
        info!(
            correlation_id,
            deleted,
            total = urls.len(),
            "cleanup batch finished"
        );

        CleanupReport {
            deleted,
            total: urls.len(),
            details,
        }
    }

    /// Delete every object in the bucket.
    ///
    /// Used by the scheduled sweep, which trusts its invocation channel
    /// rather than per-object provenance.
    pub async fn sweep_all(&self) -> Result<usize, crate::blobs::BlobError> {
        let urls = self.store.list().await?;
        let mut deleted = 0usize;
        for url in &urls {
            self.store.delete(url).await?;
            deleted += 1;
        }
        info!(deleted, "full sweep finished");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MemoryBlobStore;

    const HOST: &str = "blob.vercel-storage.com";

    #[tokio::test]
    async fn test_empty_list_skips_provider() {
        let store = Arc::new(MemoryBlobStore::new());
        let compensator = CleanupCompensator::new(store.clone(), HOST);

        let report = compensator.cleanup(&[], None).await;
        assert_eq!(report.deleted, 0);
        assert_eq!(report.total, 0);
        assert!(store.deleted_urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_untrusted_url_never_deleted() {
        let store = Arc::new(MemoryBlobStore::new());
        let compensator = CleanupCompensator::new(store.clone(), HOST);

        let urls = vec![
            "https://blob.vercel-storage.com/a".to_string(),
            "https://evil.example/b".to_string(),
        ];
        let report = compensator.cleanup(&urls, Some("cid-1")).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.deleted, 1);
        assert!(report.details[0].success);
        assert!(!report.details[1].success);

        // The untrusted URL must not have reached the provider at all
        assert_eq!(
            store.deleted_urls().await,
            vec!["https://blob.vercel-storage.com/a"]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_reported_per_url() {
        let store = Arc::new(MemoryBlobStore::failing_on("/broken"));
        let compensator = CleanupCompensator::new(store, HOST);

        let urls = vec![
            "https://blob.vercel-storage.com/ok".to_string(),
            "https://blob.vercel-storage.com/broken".to_string(),
            "https://blob.vercel-storage.com/also-ok".to_string(),
        ];
        let report = compensator.cleanup(&urls, None).await;

        assert_eq!(report.deleted, 2);
        assert_eq!(report.total, 3);
        let successes: Vec<bool> = report.details.iter().map(|d| d.success).collect();
        assert_eq!(successes, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_sweep_deletes_everything() {
        let store = Arc::new(MemoryBlobStore::new());
        store
            .seed(&[
                "https://blob.vercel-storage.com/a",
                "https://blob.vercel-storage.com/b",
            ])
            .await;
        let compensator = CleanupCompensator::new(store.clone(), HOST);

        let deleted = compensator.sweep_all().await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.remaining().await.is_empty());
    }
}
