// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client identity derivation.
//!
//! The raw client address is never persisted or embedded in a token.
//! Everything downstream of the handlers works with a salted SHA-256
//! digest of it, so neither the counter store nor the proof token can be
//! walked back to an address.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Salted one-way hasher for client-identifying values.
#[derive(Clone)]
pub struct IdentityHasher {
    salt: String,
}

impl IdentityHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Hex-encoded SHA-256 of `value + salt`. Deterministic for a fixed
    /// salt; pure.
    pub fn hash(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Truncate a hash for log output. Only the prefix ever appears in logs.
pub fn hash_prefix(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

/// Extract the client address from forwarding headers.
///
/// Takes the first entry of `x-forwarded-for`, falling back to
/// `x-real-ip`. Returns `None` when neither yields a usable value; the
/// caller must treat that as client-identity-indeterminate (400), not
/// guess.
pub fn client_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
