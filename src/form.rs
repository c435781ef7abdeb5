// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Server-side validation of contact form submissions.
//!
//! Field checks plus attachment URL constraints: attachments must be
//! HTTPS, carry no credentials or fragment, and resolve to the trusted
//! storage host. Client-side validation is advisory only; this is the
//! check that counts.

use crate::blobs::is_trusted_blob_url;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MAX_COMMENTARY_LEN: usize = 5000;
const MAX_ATTACHMENTS: usize = 5;

/// Validation error types.
#[derive(Debug, Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Too many attachments: limit is {0}")]
    TooManyAttachments(usize),

    #[error("Attachment URL not accepted: {0}")]
    UntrustedAttachment(String),
}

/// Result of validation.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(e) => Some(e),
        }
    }
}

/// A raw contact form submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub commentary: String,
    #[serde(default)]
    pub contribution: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Contact form validator.
pub struct FormValidator {
    trusted_host: String,
}

impl FormValidator {
    pub fn new(trusted_host: impl Into<String>) -> Self {
        Self {
            trusted_host: trusted_host.into(),
        }
    }

    /// Validate a complete submission.
    pub fn validate(&self, form: &SubmitForm) -> ValidationResult {
        if let Err(e) = self.validate_fields(form) {
            debug!(error = %e, "form field validation failed");
            return ValidationResult::Invalid(e);
        }

        if form.attachments.len() > MAX_ATTACHMENTS {
            return ValidationResult::Invalid(ValidationError::TooManyAttachments(
                MAX_ATTACHMENTS,
            ));
        }

        for url in &form.attachments {
            if !self.attachment_acceptable(url) {
                debug!(url = %url, "attachment url rejected");
                return ValidationResult::Invalid(ValidationError::UntrustedAttachment(
                    url.clone(),
                ));
            }
        }

        ValidationResult::Valid
    }

    fn validate_fields(&self, form: &SubmitForm) -> Result<(), ValidationError> {
        if form.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if form.name.len() > MAX_NAME_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }

        if form.email.trim().is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if form.email.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }
        if !plausible_email(&form.email) {
            return Err(ValidationError::InvalidEmail);
        }

        if form.commentary.trim().is_empty() {
            return Err(ValidationError::MissingField("commentary"));
        }
        if form.commentary.len() > MAX_COMMENTARY_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "commentary",
                max: MAX_COMMENTARY_LEN,
            });
        }

        Ok(())
    }

    /// HTTPS, no credentials, no fragment, trusted host.
    fn attachment_acceptable(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };

        parsed.scheme() == "https"
            && parsed.username().is_empty()
            && parsed.password().is_none()
            && parsed.fragment().is_none()
            && is_trusted_blob_url(url, &self.trusted_host)
    }
}

/// Minimal structural check: one `@`, non-empty local part, domain with a
/// dot. Deliverability is the email provider's problem.
fn plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
