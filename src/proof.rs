// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Upload proof tokens.
//!
//! A proof is a short-lived HS256 JWT asserting "this identity hash
//! recently passed the rate check". It is stateless: the signature makes
//! it unforgeable without the server secret, and no store round trip is
//! needed to verify it. There is no revocation list; the effective
//! single-use guarantee is the short expiry plus the rate-limit re-check
//! at consumption time.
//!
//! Verification never surfaces an error to the caller. The only valid
//! reactions to a bad proof are "proceed" or "deny", so every failure
//! class collapses to `None` and is logged.

use crate::config::ProofConfig;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Fixed issuer claim for proofs minted by this service.
pub const ISSUER: &str = "contact-guard-api";

/// Fixed audience claim; proofs are only consumed by our own endpoints.
pub const AUDIENCE: &str = "contact-guard-client";

/// Errors when minting a proof.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("failed to sign proof token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by an upload proof token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Salted hash of the client address the proof is bound to
    pub identity_hash: String,
    /// Issuance time in epoch milliseconds, checked against the freshness
    /// ceiling independently of `exp`
    pub timestamp: i64,
    /// Uniqueness nonce
    pub nonce: String,
    /// Correlation id of the flow that minted the proof
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Issues and verifies upload proof tokens.
#[derive(Clone)]
pub struct ProofService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
    max_age_ms: i64,
}

impl ProofService {
    pub fn new(config: &ProofConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            ttl_secs: config.ttl_secs,
            max_age_ms: config.max_age_secs as i64 * 1000,
        }
    }

    /// Mint a proof bound to `identity_hash`, stamped with a fresh nonce
    /// and the current time.
    pub fn issue(
        &self,
        identity_hash: &str,
        correlation_id: Option<&str>,
    ) -> Result<String, ProofError> {
        let now = chrono::Utc::now();
        let claims = ProofClaims {
            identity_hash: identity_hash.to_string(),
            timestamp: now.timestamp_millis(),
            nonce: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.map(String::from),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_secs as i64,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verify signature, issuer, audience, and expiry.
    ///
    /// Returns `None` on any failure; the reason is logged, never
    /// propagated.
    pub fn verify(&self, token: &str) -> Option<ProofClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        match jsonwebtoken::decode::<ProofClaims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!(error = %err, "proof verification failed");
                None
            }
        }
    }

    /// Whether the embedded issuance timestamp is older than the
    /// freshness ceiling. Layered on top of the signed expiry: a proof can
    /// be stale here while still technically valid per its own `exp`.
    pub fn is_stale(&self, claims: &ProofClaims) -> bool {
        let age_ms = chrono::Utc::now().timestamp_millis() - claims.timestamp;
        age_ms > self.max_age_ms
    }
}
