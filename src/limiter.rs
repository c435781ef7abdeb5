// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter backed by the counter store.
//!
//! The first increment in a window sets the key's expiry; once it lapses
//! the key disappears and the next increment starts a fresh window. There
//! is no carry-over and no sliding decay, so a burst of up to 2x the limit
//! is possible across a window boundary.
//!
//! Blocked attempts are appended to a capped audit list in the same store.
//!
//! A store outage degrades to "mostly open": the limiter reports a
//! distinct `StoreUnavailable` outcome with a single effective remaining
//! attempt and lets the caller decide whether to proceed. This trades
//! strictness for availability on a low-volume public form.

use crate::config::RateLimitConfig;
use crate::store::{CounterStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key for the append-only abuse log.
pub const ABUSE_LOG_KEY: &str = "log:rate-limit-hits";

/// Maximum retained abuse log entries; older entries are trimmed on append.
pub const ABUSE_LOG_MAX: usize = 1000;

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitOutcome {
    /// Request is within the limit
    Allowed {
        /// Remaining requests in the current window
        remaining: u32,
    },
    /// Request exceeded the limit
    Denied {
        /// Seconds until the window lapses
        retry_after: u64,
    },
    /// The counter store could not be reached; the caller chooses whether
    /// to proceed
    StoreUnavailable {
        /// Effective remaining budget while degraded
        remaining: u32,
        /// Advisory surfaced to the caller alongside the result
        advisory: String,
    },
}

impl RateLimitOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitOutcome::Denied { .. })
    }
}

/// Record appended to the abuse log when an attempt is blocked.
#[derive(Debug, Serialize)]
struct BlockedAttempt<'a> {
    key: &'a str,
    timestamp: String,
    count: i64,
    action: &'static str,
    context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
}

/// Store-backed fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Counter key for a hashed client identity.
    pub fn key_for(identity_hash: &str) -> String {
        format!("rate:ip:{identity_hash}")
    }

    /// Check the configured limit for `key`.
    ///
    /// `context` names the call site in audit records (e.g. `validate`,
    /// `upload-authorize`).
    pub async fn check(
        &self,
        key: &str,
        context: &str,
        correlation_id: Option<&str>,
    ) -> RateLimitOutcome {
        self.check_with(
            key,
            self.config.limit,
            self.config.window_secs,
            context,
            correlation_id,
        )
        .await
    }

    /// Check an explicit limit/window pair for `key`.
    pub async fn check_with(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
        context: &str,
        correlation_id: Option<&str>,
    ) -> RateLimitOutcome {
        match self
            .check_inner(key, limit, window_secs, context, correlation_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    context,
                    correlation_id, error = %err,
                    "counter store unreachable, failing open with reduced budget"
                );
                RateLimitOutcome::StoreUnavailable {
                    remaining: 1,
                    advisory: "rate limit check degraded, limited attempts remaining".to_string(),
                }
            }
        }
    }

    async fn check_inner(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
        context: &str,
        correlation_id: Option<&str>,
    ) -> Result<RateLimitOutcome, StoreError> {
        let count = self.store.incr(key).await?;

        // First increment in a window establishes its boundary
        if count == 1 {
            self.store.expire(key, window_secs as i64).await?;
        }

        if count > i64::from(limit) {
            let record = BlockedAttempt {
                key,
                timestamp: chrono::Utc::now().to_rfc3339(),
                count,
                action: "rate_limit_block",
                context,
                correlation_id,
            };
            let entry = serde_json::to_string(&record)
                .unwrap_or_else(|_| format!("{{\"key\":\"{key}\"}}"));
            self.store
                .push_capped(ABUSE_LOG_KEY, &entry, ABUSE_LOG_MAX)
                .await?;

            let ttl = self.store.ttl(key).await?;
            let retry_after = if ttl > 0 { ttl as u64 } else { window_secs };

            info!(context, correlation_id, count, retry_after, "rate limit exceeded");
            return Ok(RateLimitOutcome::Denied { retry_after });
        }

        let remaining = limit - count as u32;
        debug!(context, correlation_id, remaining, "rate limit check passed");
        Ok(RateLimitOutcome::Allowed { remaining })
    }
}
