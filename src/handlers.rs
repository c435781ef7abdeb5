// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the submission guard.
//!
//! The pipeline from the client's perspective:
//!
//! 1. `POST /api/validate` — rate check, mints the proof cookie.
//! 2. `POST /api/blob-upload` — re-validates the proof and issues the
//!    storage provider upload grant; also receives the provider's
//!    upload-completed callback.
//! 3. `POST /api/submit` — validates the form, sends the email, and
//!    cleans up uploaded attachments if the send fails.
//! 4. `POST|GET /api/cleanup` — targeted compensating deletion / full
//!    scheduled sweep.
//!
//! Internal error detail is logged with the correlation id; clients only
//! see a small stable vocabulary of messages.

use crate::cleanup::{CleanupCompensator, UrlOutcome};
use crate::config::Config;
use crate::email::{ContactMessage, Mailer};
use crate::form::{FormValidator, SubmitForm};
use crate::grant;
use crate::identity::{client_address, hash_prefix, IdentityHasher};
use crate::limiter::{RateLimitOutcome, RateLimiter};
use crate::proof::ProofService;
use crate::trace::{correlation_id_from_headers, ensure_correlation_id, CORRELATION_HEADER};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// Stable user-facing messages, keyed by error kind. Anything more
// specific stays in the logs.
const MSG_UNKNOWN_CLIENT: &str = "Could not verify client";
const MSG_RATE_LIMITED: &str = "Rate limit exceeded";
const MSG_STORE_DOWN: &str = "Validation temporarily unavailable";
const MSG_BAD_ORIGIN: &str = "Unauthorized origin";
const MSG_PROOF_REQUIRED: &str = "Validation required before upload";
const MSG_PROOF_INVALID: &str = "Invalid upload authorization";
const MSG_IDENTITY_MISMATCH: &str = "Client validation failed";
const MSG_PROOF_STALE: &str = "Validation expired, please refresh";
const MSG_UPLOAD_RATE: &str = "Rate limit exceeded for uploads";
const MSG_UNAUTHORIZED: &str = "Unauthorized";
const MSG_NO_URLS: &str = "No URLs provided";
const MSG_VALIDATION_FAILED: &str = "Please check the form fields and try again";
const MSG_SEND_FAILED: &str = "Your message could not be sent, please try again later";
const MSG_SEND_SUCCESS: &str = "Message sent";

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub hasher: IdentityHasher,
    pub limiter: RateLimiter,
    pub proofs: ProofService,
    pub compensator: CleanupCompensator,
    pub validator: FormValidator,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn crate::store::CounterStore>,
        blobs: Arc<dyn crate::blobs::BlobStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            hasher: IdentityHasher::new(config.hash_salt.clone()),
            limiter: RateLimiter::new(store, config.rate_limit.clone()),
            proofs: ProofService::new(&config.proof),
            compensator: CleanupCompensator::new(blobs, config.upload.storage_host.clone()),
            validator: FormValidator::new(config.upload.storage_host.clone()),
            mailer,
            config,
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/validate", post(validate))
        .route("/api/blob-upload", post(authorize_upload))
        .route("/api/cleanup", post(cleanup_targeted).get(cleanup_sweep))
        .route("/api/submit", post(submit))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Validate endpoint response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Generic error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Upload handshake request, tagged the way the provider client sends it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum UploadRequest {
    #[serde(rename = "blob.generate-client-token")]
    GenerateToken { payload: GenerateTokenPayload },
    #[serde(rename = "blob.upload-completed")]
    UploadCompleted { payload: UploadCompletedPayload },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenPayload {
    pub pathname: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompletedPayload {
    pub blob: CompletedBlob,
    #[serde(default)]
    pub token_payload: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletedBlob {
    pub url: String,
}

/// Targeted cleanup request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Targeted cleanup response.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub deleted: usize,
    pub total: usize,
    pub details: Vec<UrlOutcome>,
}

/// Submission response. Always 200; the `success` flag carries the
/// outcome, the message stays generic.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
    pub correlation_id: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "contact-submission-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn correlation(correlation_id: &str) -> [(&'static str, String); 1] {
    [(CORRELATION_HEADER, correlation_id.to_string())]
}

fn origin_allowed(config: &Config, headers: &HeaderMap) -> bool {
    let origin = match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(o) => o,
        None => return false,
    };
    if config.production && !origin.starts_with("https://") {
        return false;
    }
    config.allowed_origins.iter().any(|o| o == origin)
}

/// Rate-check a client and vouch for it with a proof cookie.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let correlation_id = correlation_id_from_headers(&headers);

    let address = match client_address(&headers) {
        Some(addr) => addr,
        None => {
            warn!(correlation_id, "no usable client address on validate");
            return (
                StatusCode::BAD_REQUEST,
                correlation(&correlation_id),
                Json(ErrorResponse {
                    error: MSG_UNKNOWN_CLIENT.to_string(),
                }),
            )
                .into_response();
        }
    };

    let identity_hash = state.hasher.hash(&address);
    let key = RateLimiter::key_for(&identity_hash);

    match state
        .limiter
        .check(&key, "validate", Some(&correlation_id))
        .await
    {
        RateLimitOutcome::Allowed { remaining } => {
            let token = match state.proofs.issue(&identity_hash, Some(&correlation_id)) {
                Ok(token) => token,
                Err(err) => {
                    error!(correlation_id, error = %err, "failed to mint upload proof");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        correlation(&correlation_id),
                        Json(ErrorResponse {
                            error: MSG_STORE_DOWN.to_string(),
                        }),
                    )
                        .into_response();
                }
            };

            let mut cookie = Cookie::new(state.config.proof.cookie_name.clone(), token);
            cookie.set_http_only(true);
            cookie.set_secure(state.config.production);
            cookie.set_same_site(SameSite::Strict);
            cookie.set_path("/api");
            cookie.set_max_age(time::Duration::seconds(state.config.proof.ttl_secs as i64));

            info!(
                correlation_id,
                identity = hash_prefix(&identity_hash),
                remaining,
                "client validated, proof issued"
            );

            (
                StatusCode::OK,
                jar.add(cookie),
                correlation(&correlation_id),
                Json(ValidateResponse {
                    allowed: true,
                    remaining,
                    retry_after: None,
                    error: None,
                }),
            )
                .into_response()
        }
        RateLimitOutcome::Denied { retry_after } => (
            StatusCode::TOO_MANY_REQUESTS,
            correlation(&correlation_id),
            Json(ValidateResponse {
                allowed: false,
                remaining: 0,
                retry_after: Some(retry_after),
                error: Some(MSG_RATE_LIMITED.to_string()),
            }),
        )
            .into_response(),
        RateLimitOutcome::StoreUnavailable { .. } => {
            // The first hop has nothing to vouch for a client with if the
            // store is down; fail closed here, open on the re-check
            (
                StatusCode::SERVICE_UNAVAILABLE,
                correlation(&correlation_id),
                Json(ErrorResponse {
                    error: MSG_STORE_DOWN.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Gate the storage provider's upload token exchange on a valid proof.
pub async fn authorize_upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(request): Json<UploadRequest>,
) -> Response {
    let correlation_id = correlation_id_from_headers(&headers);

    match request {
        UploadRequest::UploadCompleted { payload } => {
            upload_completed(&state, payload, &correlation_id)
        }
        UploadRequest::GenerateToken { payload } => {
            generate_upload_token(&state, &jar, &headers, payload, &correlation_id).await
        }
    }
}

/// Provider callback after the client finished uploading. Not a
/// client-initiated transition; authenticated by the echoed audit
/// payload, not the proof cookie.
fn upload_completed(
    state: &AppState,
    payload: UploadCompletedPayload,
    correlation_id: &str,
) -> Response {
    let trusted = crate::blobs::is_trusted_blob_url(
        &payload.blob.url,
        &state.config.upload.storage_host,
    );

    let audit = payload
        .token_payload
        .as_deref()
        .and_then(|raw| serde_json::from_str::<grant::GrantAudit>(raw).ok());

    info!(
        correlation_id = audit
            .as_ref()
            .map(|a| a.correlation_id.as_str())
            .unwrap_or(correlation_id),
        identity = audit.as_ref().map(|a| a.ip_hash.as_str()).unwrap_or("unknown"),
        url = if trusted { payload.blob.url.as_str() } else { "[invalid-host]" },
        trusted,
        "blob upload completed"
    );

    (
        StatusCode::OK,
        correlation(correlation_id),
        Json(serde_json::json!({ "response": "ok" })),
    )
        .into_response()
}

async fn generate_upload_token(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
    payload: GenerateTokenPayload,
    correlation_id: &str,
) -> Response {
    let deny = |status: StatusCode, message: &str| {
        (
            status,
            correlation(correlation_id),
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    };

    if !origin_allowed(&state.config, headers) {
        warn!(correlation_id, "blocked upload authorization from unauthorized origin");
        return deny(StatusCode::FORBIDDEN, MSG_BAD_ORIGIN);
    }

    let address = match client_address(headers) {
        Some(addr) => addr,
        None => {
            warn!(correlation_id, "no usable client address on upload authorization");
            return deny(StatusCode::BAD_REQUEST, MSG_UNKNOWN_CLIENT);
        }
    };
    let identity_hash = state.hasher.hash(&address);

    let proof_cookie = match jar.get(&state.config.proof.cookie_name) {
        Some(cookie) => cookie,
        None => {
            warn!(
                correlation_id,
                identity = hash_prefix(&identity_hash),
                "missing upload proof cookie"
            );
            return deny(StatusCode::FORBIDDEN, MSG_PROOF_REQUIRED);
        }
    };

    let claims = match state.proofs.verify(proof_cookie.value()) {
        Some(claims) => claims,
        None => {
            warn!(correlation_id, "invalid upload proof token");
            return deny(StatusCode::FORBIDDEN, MSG_PROOF_INVALID);
        }
    };

    // Binds the proof to the network position it was issued for; a cookie
    // replayed from elsewhere hashes differently
    if claims.identity_hash != identity_hash {
        warn!(
            correlation_id,
            token_identity = hash_prefix(&claims.identity_hash),
            request_identity = hash_prefix(&identity_hash),
            "identity mismatch in upload proof"
        );
        return deny(StatusCode::FORBIDDEN, MSG_IDENTITY_MISMATCH);
    }

    if state.proofs.is_stale(&claims) {
        warn!(
            correlation_id,
            issued_at_ms = claims.timestamp,
            "upload proof past freshness ceiling"
        );
        return deny(StatusCode::FORBIDDEN, MSG_PROOF_STALE);
    }

    // Second hop re-checks the same window; catches rapid abuse between
    // validate and upload
    let key = RateLimiter::key_for(&identity_hash);
    match state
        .limiter
        .check(&key, "upload-authorize", Some(correlation_id))
        .await
    {
        RateLimitOutcome::Denied { .. } => {
            return deny(StatusCode::FORBIDDEN, MSG_UPLOAD_RATE);
        }
        RateLimitOutcome::Allowed { .. } => {}
        RateLimitOutcome::StoreUnavailable { advisory, .. } => {
            debug!(correlation_id, advisory = %advisory, "proceeding with degraded rate check");
        }
    }

    match grant::issue_grant(
        &state.config.upload,
        &payload.pathname,
        hash_prefix(&identity_hash),
        correlation_id,
    ) {
        Ok(grant) => {
            info!(
                correlation_id,
                identity = hash_prefix(&identity_hash),
                pathname = %payload.pathname,
                "upload grant issued"
            );
            (StatusCode::OK, correlation(correlation_id), Json(grant)).into_response()
        }
        Err(err) => {
            error!(correlation_id, error = %err, "failed to issue upload grant");
            deny(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

/// Targeted compensating cleanup. Destructive, so doubly guarded:
/// same-origin plus a shared internal secret.
pub async fn cleanup_targeted(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CleanupRequest>,
) -> Response {
    let correlation_id = ensure_correlation_id(
        request
            .correlation_id
            .as_deref()
            .or_else(|| headers.get(CORRELATION_HEADER).and_then(|v| v.to_str().ok())),
    );

    if !origin_allowed(&state.config, &headers) {
        warn!(correlation_id, "blocked cleanup from unauthorized origin");
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: MSG_BAD_ORIGIN.to_string(),
            }),
        )
            .into_response();
    }

    let secret = &state.config.secrets.internal_cleanup;
    let presented = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok());
    if secret.is_empty() || secret == "change-me-in-production" || presented != Some(secret) {
        warn!(correlation_id, "cleanup internal secret check failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: MSG_UNAUTHORIZED.to_string(),
            }),
        )
            .into_response();
    }

    if request.urls.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: MSG_NO_URLS.to_string(),
            }),
        )
            .into_response();
    }

    let report = state
        .compensator
        .cleanup(&request.urls, Some(&correlation_id))
        .await;

    (
        StatusCode::OK,
        Json(CleanupResponse {
            message: format!("Deleted {} of {} blobs", report.deleted, report.total),
            deleted: report.deleted,
            total: report.total,
            details: report.details,
        }),
    )
        .into_response()
}

/// Scheduled full-bucket sweep. Authorized purely by the scheduler's
/// bearer token.
pub async fn cleanup_sweep(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let secret = &state.config.secrets.scheduler;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if secret.is_empty() || presented != Some(&format!("Bearer {secret}")) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.compensator.sweep_all().await {
        Ok(deleted) => {
            info!(deleted, "scheduled sweep completed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!(error = %err, "scheduled sweep failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handle a contact form submission: validate, send the email, and
/// compensate by deleting uploaded attachments if the send fails.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(form): Json<SubmitForm>,
) -> Response {
    let correlation_id = ensure_correlation_id(
        form.correlation_id
            .as_deref()
            .or_else(|| headers.get(CORRELATION_HEADER).and_then(|v| v.to_str().ok())),
    );

    let respond = |success: bool, message: &'static str, correlation_id: &str| {
        (
            StatusCode::OK,
            correlation(correlation_id),
            Json(SubmitResponse {
                success,
                message,
                correlation_id: correlation_id.to_string(),
            }),
        )
            .into_response()
    };

    info!(correlation_id, "processing form submission");

    let validation = state.validator.validate(&form);
    if let Some(err) = validation.error() {
        info!(correlation_id, error = %err, "form validation failed");
        return respond(false, MSG_VALIDATION_FAILED, &correlation_id);
    }

    let message = ContactMessage {
        name: form.name.clone(),
        email: form.email.clone(),
        commentary: form.commentary.clone(),
        contribution: form.contribution.clone(),
        attachment_urls: form.attachments.clone(),
    };

    if let Err(err) = state.mailer.send(&message, &correlation_id).await {
        error!(correlation_id, error = %err, "email send failed");

        if !form.attachments.is_empty() {
            let report = state
                .compensator
                .cleanup(&form.attachments, Some(&correlation_id))
                .await;
            info!(
                correlation_id,
                deleted = report.deleted,
                total = report.total,
                "cleaned up attachments after failed send"
            );
        }

        return respond(false, MSG_SEND_FAILED, &correlation_id);
    }

    info!(correlation_id, "email sent successfully");
    respond(true, MSG_SEND_SUCCESS, &correlation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MemoryBlobStore;
    use crate::email::EmailError;
    use crate::store::{CounterStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;
    use tokio::sync::RwLock;

    struct MockMailer {
        fail: bool,
        sent: RwLock<Vec<ContactMessage>>,
    }

    impl MockMailer {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                sent: RwLock::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send(
            &self,
            message: &ContactMessage,
            _correlation_id: &str,
        ) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Rejected(500));
            }
            self.sent.write().await.push(message.clone());
            Ok(())
        }
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn expire(&self, _key: &str, _secs: i64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn push_capped(
            &self,
            _key: &str,
            _entry: &str,
            _max_len: usize,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn test_config() -> Config {
        Config {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            secrets: crate::config::SecretsConfig {
                internal_cleanup: "internal-secret".to_string(),
                scheduler: "cron-secret".to_string(),
            },
            ..Default::default()
        }
    }

    struct TestApp {
        state: Arc<AppState>,
        blobs: Arc<MemoryBlobStore>,
    }

    fn test_app(config: Config, mailer_fails: bool) -> TestApp {
        let blobs = Arc::new(MemoryBlobStore::new());
        let state = Arc::new(AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            blobs.clone(),
            Arc::new(MockMailer::new(mailer_fails)),
        ));
        TestApp { state, blobs }
    }

    fn client_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"));
        headers
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validate_sets_proof_cookie() {
        let app = test_app(test_config(), false);
        let response = validate(State(app.state.clone()), CookieJar::new(), client_headers()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("proof cookie should be set");
        assert!(set_cookie.starts_with("upload_proof="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Path=/api"));

        let body = body_json(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["remaining"], 4);
    }

    #[tokio::test]
    async fn test_validate_without_address_is_400() {
        let app = test_app(test_config(), false);
        let response = validate(State(app.state), CookieJar::new(), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_rate_limits_after_budget() {
        let app = test_app(test_config(), false);

        for _ in 0..5 {
            let response =
                validate(State(app.state.clone()), CookieJar::new(), client_headers()).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = validate(State(app.state), CookieJar::new(), client_headers()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["allowed"], false);
        assert!(body["retryAfter"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_validate_fails_closed_on_store_outage() {
        let state = Arc::new(AppState::new(
            test_config(),
            Arc::new(DownStore),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MockMailer::new(false)),
        ));

        let response = validate(State(state), CookieJar::new(), client_headers()).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // No proof may be minted while the limiter cannot vouch for anyone
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["error"], MSG_STORE_DOWN);
    }

    #[tokio::test]
    async fn test_upload_recheck_fails_open_on_store_outage() {
        let state = Arc::new(AppState::new(
            test_config(),
            Arc::new(DownStore),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MockMailer::new(false)),
        ));

        // The client already holds a valid proof from before the outage
        let identity_hash = state.hasher.hash("203.0.113.7");
        let token = state.proofs.issue(&identity_hash, None).unwrap();

        let jar = CookieJar::new().add(Cookie::new("upload_proof", token));
        let request = UploadRequest::GenerateToken {
            payload: GenerateTokenPayload {
                pathname: "photo.jpg".to_string(),
            },
        };
        let response = authorize_upload(State(state), jar, client_headers(), Json(request)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_upload_requires_proof_cookie() {
        let app = test_app(test_config(), false);

        let request = UploadRequest::GenerateToken {
            payload: GenerateTokenPayload {
                pathname: "photo.jpg".to_string(),
            },
        };
        let response = authorize_upload(
            State(app.state),
            CookieJar::new(),
            client_headers(),
            Json(request),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], MSG_PROOF_REQUIRED);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_origin() {
        let app = test_app(test_config(), false);

        let mut headers = client_headers();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        let request = UploadRequest::GenerateToken {
            payload: GenerateTokenPayload {
                pathname: "photo.jpg".to_string(),
            },
        };
        let response =
            authorize_upload(State(app.state), CookieJar::new(), headers, Json(request)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], MSG_BAD_ORIGIN);
    }

    #[tokio::test]
    async fn test_full_validate_then_upload_flow() {
        let app = test_app(test_config(), false);

        let response =
            validate(State(app.state.clone()), CookieJar::new(), client_headers()).await;
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        let token = set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap();

        let jar = CookieJar::new().add(Cookie::new("upload_proof", token));
        let request = UploadRequest::GenerateToken {
            payload: GenerateTokenPayload {
                pathname: "photo.jpg".to_string(),
            },
        };
        let response =
            authorize_upload(State(app.state), jar, client_headers(), Json(request)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["token"].as_str().is_some());
        assert_eq!(body["multipart"], true);
        assert_eq!(body["addRandomSuffix"], true);
    }

    #[tokio::test]
    async fn test_upload_proof_bound_to_identity() {
        let app = test_app(test_config(), false);

        let response =
            validate(State(app.state.clone()), CookieJar::new(), client_headers()).await;
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        let token = set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap();

        // Same cookie, different network position
        let mut headers = client_headers();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.99"));

        let jar = CookieJar::new().add(Cookie::new("upload_proof", token));
        let request = UploadRequest::GenerateToken {
            payload: GenerateTokenPayload {
                pathname: "photo.jpg".to_string(),
            },
        };
        let response = authorize_upload(State(app.state), jar, headers, Json(request)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], MSG_IDENTITY_MISMATCH);
    }

    #[tokio::test]
    async fn test_upload_completed_flags_untrusted_host() {
        let app = test_app(test_config(), false);

        let request = UploadRequest::UploadCompleted {
            payload: UploadCompletedPayload {
                blob: CompletedBlob {
                    url: "https://evil.example/file".to_string(),
                },
                token_payload: None,
            },
        };
        // Provider callbacks carry neither origin nor proof cookie
        let response = authorize_upload(
            State(app.state),
            CookieJar::new(),
            HeaderMap::new(),
            Json(request),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cleanup_requires_internal_secret() {
        let app = test_app(test_config(), false);

        let request = CleanupRequest {
            urls: vec!["https://blob.vercel-storage.com/a".to_string()],
            correlation_id: None,
        };
        let response = cleanup_targeted(State(app.state), client_headers(), Json(request)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cleanup_empty_list_is_400() {
        let app = test_app(test_config(), false);

        let mut headers = client_headers();
        headers.insert("x-internal-secret", HeaderValue::from_static("internal-secret"));
        let request = CleanupRequest {
            urls: vec![],
            correlation_id: None,
        };
        let response = cleanup_targeted(State(app.state), headers, Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cleanup_reports_per_url() {
        let app = test_app(test_config(), false);
        app.blobs.seed(&["https://blob.vercel-storage.com/a"]).await;

        let mut headers = client_headers();
        headers.insert("x-internal-secret", HeaderValue::from_static("internal-secret"));
        let request = CleanupRequest {
            urls: vec![
                "https://blob.vercel-storage.com/a".to_string(),
                "https://evil.example/b".to_string(),
            ],
            correlation_id: None,
        };
        let response = cleanup_targeted(State(app.state), headers, Json(request)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["deleted"], 1);
        assert_eq!(body["total"], 2);
        assert_eq!(body["details"][1]["success"], false);

        assert_eq!(
            app.blobs.deleted_urls().await,
            vec!["https://blob.vercel-storage.com/a"]
        );
    }

    #[tokio::test]
    async fn test_sweep_requires_bearer() {
        let app = test_app(test_config(), false);

        let response = cleanup_sweep(State(app.state.clone()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer cron-secret"),
        );
        let response = cleanup_sweep(State(app.state), headers).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_submit_success() {
        let app = test_app(test_config(), false);

        let form = SubmitForm {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            commentary: "Hello".to_string(),
            contribution: None,
            attachments: vec![],
            correlation_id: None,
        };
        let response = submit(State(app.state), HeaderMap::new(), Json(form)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_failed_send_cleans_up_attachments() {
        let app = test_app(test_config(), true);
        app.blobs
            .seed(&["https://blob.vercel-storage.com/photo-x1.jpg"])
            .await;

        let form = SubmitForm {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            commentary: "Hello".to_string(),
            contribution: None,
            attachments: vec!["https://blob.vercel-storage.com/photo-x1.jpg".to_string()],
            correlation_id: None,
        };
        let response = submit(State(app.state), HeaderMap::new(), Json(form)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], MSG_SEND_FAILED);

        // Compensating cleanup removed the orphaned upload
        assert_eq!(
            app.blobs.deleted_urls().await,
            vec!["https://blob.vercel-storage.com/photo-x1.jpg"]
        );
    }

    #[tokio::test]
    async fn test_submit_validation_failure_keeps_attachments() {
        let app = test_app(test_config(), false);
        app.blobs
            .seed(&["https://blob.vercel-storage.com/photo-x1.jpg"])
            .await;

        let form = SubmitForm {
            name: String::new(),
            email: "ada@example.org".to_string(),
            commentary: "Hello".to_string(),
            contribution: None,
            attachments: vec!["https://blob.vercel-storage.com/photo-x1.jpg".to_string()],
            correlation_id: None,
        };
        let response = submit(State(app.state), HeaderMap::new(), Json(form)).await;

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], MSG_VALIDATION_FAILED);

        // A resubmittable validation failure must not destroy uploads
        assert!(app.blobs.deleted_urls().await.is_empty());
    }
}
