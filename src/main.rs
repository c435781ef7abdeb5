// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Contact Submission Guard Service
//!
//! Protects the contact form's attachment pipeline:
//!
//! - `POST /api/validate` rate-limits the client and sets a signed proof
//!   cookie
//! - `POST /api/blob-upload` gates the storage-provider upload token on
//!   that proof
//! - `POST /api/submit` validates the form, sends the email, and cleans
//!   up uploads on failure
//! - `POST|GET /api/cleanup` targeted compensating deletion and the
//!   scheduled full sweep
//!
//! ## Configuration
//!
//! Loaded from environment variables; see `config::Config::from_env`:
//!
//! - `BIND_ADDR`: server bind address (default: 0.0.0.0:8080)
//! - `REDIS_URL`: counter store URL
//! - `RATE_LIMIT` / `RATE_WINDOW_SECS`: validations per window (default: 5 per 24h)
//! - `PROOF_SIGNING_SECRET`, `HASH_SALT`: server secrets
//! - `ALLOWED_ORIGINS`: comma-separated origin allowlist

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use contact_submission_guard::{
    blobs::HttpBlobClient,
    config::Config,
    email::ResendMailer,
    handlers::{router, AppState},
    store::RedisStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        rate_limit = config.rate_limit.limit,
        rate_window_secs = config.rate_limit.window_secs,
        proof_ttl_secs = config.proof.ttl_secs,
        storage_host = %config.upload.storage_host,
        "Starting contact submission guard"
    );

    // Connect the counter store once; the manager is cloned per request
    let store = RedisStore::connect(&config.redis_url).await?;

    // Create application state
    let blobs = HttpBlobClient::new(
        config.upload.storage_api.clone(),
        config.upload.provider_token.clone(),
    );
    let mailer = ResendMailer::new(config.email.clone());

    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(store),
        Arc::new(blobs),
        Arc::new(mailer),
    ));

    // Build router
    let app = router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_credentials(true),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
