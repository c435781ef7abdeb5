// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the contact submission guard.
//!
//! Defaults mirror the production deployment of the contact form: 5
//! validations per client per 24 hours, 5-minute upload proofs, and a
//! 3-minute upload grant lifetime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the submission guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins allowed to call the browser-facing endpoints
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Whether the service runs in production (enforces HTTPS origins,
    /// marks the proof cookie as Secure)
    #[serde(default)]
    pub production: bool,

    /// Counter store connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Salt mixed into the identity hash; never user-supplied
    #[serde(default = "default_hash_salt")]
    pub hash_salt: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upload proof token configuration
    #[serde(default)]
    pub proof: ProofConfig,

    /// Upload grant configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Email dispatch configuration
    #[serde(default)]
    pub email: EmailConfig,

    /// Secrets guarding the cleanup endpoints
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum validations per identity per window (default: 5)
    #[serde(default = "default_rate_limit")]
    pub limit: u32,

    /// Window length in seconds (default: 86400, i.e. 24 hours)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// Upload proof token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Cookie carrying the proof between validate and upload-authorize
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// HS256 signing secret for proof tokens
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,

    /// Signed token lifetime in seconds (default: 300)
    #[serde(default = "default_proof_ttl_secs")]
    pub ttl_secs: u64,

    /// Freshness ceiling on the embedded issuance timestamp, enforced
    /// independently of the signed expiry (default: 300)
    #[serde(default = "default_proof_ttl_secs")]
    pub max_age_secs: u64,
}

/// Upload grant configuration for the storage provider handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Grant lifetime in seconds (default: 180)
    #[serde(default = "default_grant_expiry_secs")]
    pub grant_expiry_secs: u64,

    /// Maximum size per uploaded file in megabytes (default: 50)
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Content types the grant allows
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,

    /// Hostname uploaded objects must resolve to before they are trusted
    #[serde(default = "default_storage_host")]
    pub storage_host: String,

    /// Storage provider API base URL
    #[serde(default = "default_storage_api")]
    pub storage_api: String,

    /// Storage provider read/write token
    #[serde(default)]
    pub provider_token: String,
}

/// Email dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Transactional email API base URL
    #[serde(default = "default_email_api")]
    pub api_url: String,

    /// API key for the email provider
    #[serde(default)]
    pub api_key: String,

    /// Sender address
    #[serde(default = "default_email_from")]
    pub from: String,

    /// Recipient address
    #[serde(default = "default_email_to")]
    pub to: String,
}

/// Secrets guarding the destructive cleanup endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Shared secret the submission handler presents to targeted cleanup
    #[serde(default)]
    pub internal_cleanup: String,

    /// Bearer token the scheduler presents to the full sweep
    #[serde(default)]
    pub scheduler: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_hash_salt() -> String {
    "default-salt".to_string()
}

fn default_rate_limit() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_cookie_name() -> String {
    "upload_proof".to_string()
}

fn default_signing_secret() -> String {
    "dev_secret_change_me_in_production".to_string()
}

fn default_proof_ttl_secs() -> u64 {
    300
}

fn default_grant_expiry_secs() -> u64 {
    180
}

fn default_max_size_mb() -> u64 {
    50
}

fn default_content_types() -> Vec<String> {
    vec![
        "image/*".to_string(),
        "video/*".to_string(),
        "application/pdf".to_string(),
        "application/msword".to_string(),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
    ]
}

fn default_storage_host() -> String {
    "blob.vercel-storage.com".to_string()
}

fn default_storage_api() -> String {
    "https://blob.vercel-storage.com".to_string()
}

fn default_email_api() -> String {
    "https://api.resend.com".to_string()
}

fn default_email_from() -> String {
    "web@contact.example.org".to_string()
}

fn default_email_to() -> String {
    "inbox@example.org".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
            production: false,
            redis_url: default_redis_url(),
            hash_salt: default_hash_salt(),
            rate_limit: RateLimitConfig::default(),
            proof: ProofConfig::default(),
            upload: UploadConfig::default(),
            email: EmailConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            signing_secret: default_signing_secret(),
            ttl_secs: default_proof_ttl_secs(),
            max_age_secs: default_proof_ttl_secs(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            grant_expiry_secs: default_grant_expiry_secs(),
            max_size_mb: default_max_size_mb(),
            allowed_content_types: default_content_types(),
            storage_host: default_storage_host(),
            storage_api: default_storage_api(),
            provider_token: String::new(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api(),
            api_key: String::new(),
            from: default_email_from(),
            to: default_email_to(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            internal_cleanup: String::new(),
            scheduler: String::new(),
        }
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl ProofConfig {
    /// Get the freshness ceiling duration
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl UploadConfig {
    /// Maximum size per file in bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            bind_addr: env_string("BIND_ADDR", defaults.bind_addr),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).collect())
                .unwrap_or(defaults.allowed_origins),
            production: std::env::var("ENVIRONMENT")
                .map(|v| v == "production")
                .unwrap_or(false),
            redis_url: env_string("REDIS_URL", defaults.redis_url),
            hash_salt: env_string("HASH_SALT", defaults.hash_salt),
            rate_limit: RateLimitConfig {
                limit: env_parse("RATE_LIMIT", defaults.rate_limit.limit),
                window_secs: env_parse("RATE_WINDOW_SECS", defaults.rate_limit.window_secs),
            },
            proof: ProofConfig {
                cookie_name: env_string("PROOF_COOKIE_NAME", defaults.proof.cookie_name),
                signing_secret: env_string("PROOF_SIGNING_SECRET", defaults.proof.signing_secret),
                ttl_secs: env_parse("PROOF_TTL_SECS", defaults.proof.ttl_secs),
                max_age_secs: env_parse("PROOF_MAX_AGE_SECS", defaults.proof.max_age_secs),
            },
            upload: UploadConfig {
                grant_expiry_secs: env_parse(
                    "UPLOAD_GRANT_EXPIRY_SECS",
                    defaults.upload.grant_expiry_secs,
                ),
                max_size_mb: env_parse("UPLOAD_MAX_SIZE_MB", defaults.upload.max_size_mb),
                allowed_content_types: defaults.upload.allowed_content_types,
                storage_host: env_string("STORAGE_HOST", defaults.upload.storage_host),
                storage_api: env_string("STORAGE_API", defaults.upload.storage_api),
                provider_token: env_string("BLOB_READ_WRITE_TOKEN", defaults.upload.provider_token),
            },
            email: EmailConfig {
                api_url: env_string("EMAIL_API_URL", defaults.email.api_url),
                api_key: env_string("RESEND_API_KEY", defaults.email.api_key),
                from: env_string("CONTACT_EMAIL_FROM", defaults.email.from),
                to: env_string("CONTACT_EMAIL_TO", defaults.email.to),
            },
            secrets: SecretsConfig {
                internal_cleanup: env_string(
                    "INTERNAL_CLEANUP_SECRET",
                    defaults.secrets.internal_cleanup,
                ),
                scheduler: env_string("CRON_SECRET", defaults.secrets.scheduler),
            },
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
