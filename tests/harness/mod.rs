// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for the submission guard.
//!
//! Builds the full service router on in-process fakes: an in-memory
//! counter store, a recording blob store, and a mailer that can be told
//! to fail. Requests go through `tower::ServiceExt::oneshot`, so the
//! whole axum stack (routing, extractors, serialization) is exercised.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use contact_submission_guard::blobs::MemoryBlobStore;
use contact_submission_guard::config::{Config, SecretsConfig};
use contact_submission_guard::email::{ContactMessage, EmailError, Mailer};
use contact_submission_guard::handlers::{router, AppState};
use contact_submission_guard::store::MemoryStore;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

pub const ORIGIN: &str = "http://localhost:3000";
pub const CLIENT_IP: &str = "203.0.113.7";
pub const INTERNAL_SECRET: &str = "internal-secret";
pub const CRON_SECRET: &str = "cron-secret";

/// Mailer that records messages and fails on demand.
#[derive(Default)]
pub struct RecordingMailer {
    pub fail: AtomicBool,
    pub sent: RwLock<Vec<ContactMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &ContactMessage, _correlation_id: &str) -> Result<(), EmailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::Rejected(500));
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn default_config() -> Config {
    Config {
        allowed_origins: vec![ORIGIN.to_string()],
        secrets: SecretsConfig {
            internal_cleanup: INTERNAL_SECRET.to_string(),
            scheduler: CRON_SECRET.to_string(),
        },
        ..Default::default()
    }
}

pub fn build(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        blobs.clone(),
        mailer.clone(),
    ));

    TestApp {
        router: router(state),
        store,
        blobs,
        mailer,
    }
}

impl TestApp {
    /// POST a JSON body as the default test client.
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ORIGIN, ORIGIN)
                .header("x-forwarded-for", CLIENT_IP)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Extract the proof token from a validate response's Set-Cookie header.
pub fn proof_cookie(response: &Response<Body>) -> Option<String> {
    let set_cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let (name_value, _) = set_cookie.split_once(';')?;
    let (_, value) = name_value.split_once('=')?;
    Some(value.to_string())
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
