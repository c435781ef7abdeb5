// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Contact Submission Guard
//!
//! This crate protects a public contact form from automated abuse with a
//! two-step handshake:
//!
//! - Per-client rate limiting against a shared counter store
//! - A short-lived signed proof cookie vouching for a validated client
//! - An upload authorizer that re-validates the proof before issuing a
//!   storage-provider upload grant
//! - Compensating cleanup of uploaded objects when the downstream email
//!   send fails
//!
//! The limiter deliberately fails open under store outage: a low-volume
//! public form should degrade to "mostly open" rather than lock out
//! legitimate senders.

pub mod blobs;
pub mod cleanup;
pub mod config;
pub mod email;
pub mod form;
pub mod grant;
pub mod handlers;
pub mod identity;
pub mod limiter;
pub mod proof;
pub mod store;
pub mod trace;

pub use config::Config;
pub use limiter::{RateLimitOutcome, RateLimiter};
pub use proof::{ProofClaims, ProofService};
