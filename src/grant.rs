// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Upload grants.
//!
//! The last step of the validate -> upload handshake: once the proof and
//! rate checks pass, the client receives a short-lived, provider-scoped
//! authorization to push bytes directly to storage. The grant carries a
//! content-type allowlist, a size ceiling, and an audit payload that the
//! provider echoes back verbatim on upload completion.

use crate::config::UploadConfig;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors when issuing a grant.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("failed to serialize grant payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid provider signing key")]
    InvalidKey,
}

/// Audit fields embedded in the grant and echoed back by the provider on
/// completion. Carries a hash prefix only, never a full identity hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAudit {
    pub timestamp: String,
    pub ip_hash: String,
    pub correlation_id: String,
}

/// A provider upload authorization.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    /// Signed token the client presents to the provider
    pub token: String,
    pub allowed_content_types: Vec<String>,
    pub maximum_size_in_bytes: u64,
    /// Multipart uploads for large files
    pub multipart: bool,
    /// Random filename suffixing to avoid collisions
    pub add_random_suffix: bool,
    /// Grant expiry as epoch seconds
    pub valid_until: i64,
    /// Audit payload echoed back on completion
    pub token_payload: String,
}

#[derive(Serialize)]
struct SignedGrantBody<'a> {
    pathname: &'a str,
    allowed_content_types: &'a [String],
    maximum_size_in_bytes: u64,
    valid_until: i64,
    token_payload: &'a str,
}

/// Build and sign an upload grant for a validated client.
pub fn issue_grant(
    config: &UploadConfig,
    pathname: &str,
    identity_hash_prefix: &str,
    correlation_id: &str,
) -> Result<UploadGrant, GrantError> {
    let valid_until =
        chrono::Utc::now().timestamp() + config.grant_expiry_secs as i64;

    let audit = GrantAudit {
        timestamp: chrono::Utc::now().to_rfc3339(),
        ip_hash: identity_hash_prefix.to_string(),
        correlation_id: correlation_id.to_string(),
    };
    let token_payload = serde_json::to_string(&audit)?;

    let body = SignedGrantBody {
        pathname,
        allowed_content_types: &config.allowed_content_types,
        maximum_size_in_bytes: config.max_size_bytes(),
        valid_until,
        token_payload: &token_payload,
    };
    let body_json = serde_json::to_vec(&body)?;

    let mut mac = HmacSha256::new_from_slice(config.provider_token.as_bytes())
        .map_err(|_| GrantError::InvalidKey)?;
    mac.update(&body_json);
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    let token = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&body_json),
        signature
    );

    Ok(UploadGrant {
        token,
        allowed_content_types: config.allowed_content_types.clone(),
        maximum_size_in_bytes: config.max_size_bytes(),
        multipart: true,
        add_random_suffix: true,
        valid_until,
        token_payload,
    })
}
