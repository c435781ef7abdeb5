// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Correlation id handling for multi-hop request flows.
//!
//! Every client-initiated flow (validate, upload, submit, cleanup) carries
//! one correlation id so its log lines can be unified. A caller-supplied
//! candidate is kept only if it is a well-formed UUID v4; anything else is
//! replaced with a fresh id rather than rejected.

use axum::http::HeaderMap;
use uuid::{Uuid, Version};

/// Header used to propagate the correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Return a usable correlation id.
///
/// Keeps `candidate` unchanged iff it parses as a UUID v4; otherwise mints
/// a new one. Never fails.
pub fn ensure_correlation_id(candidate: Option<&str>) -> String {
    if let Some(raw) = candidate {
        if let Ok(parsed) = Uuid::parse_str(raw) {
            if parsed.get_version() == Some(Version::Random) {
                return raw.to_string();
            }
        }
    }
    Uuid::new_v4().to_string()
}

/// Extract the correlation id from request headers, minting one if the
/// header is absent or malformed.
pub fn correlation_id_from_headers(headers: &HeaderMap) -> String {
    let candidate = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok());
    ensure_correlation_id(candidate)
}
