// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Transactional email dispatch.
//!
//! The submission handler is the only caller. Provider errors are logged
//! with the correlation id and reported upward as a single error type;
//! the client only ever sees a stable generic message.

use crate::config::EmailConfig;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Errors from the email provider.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("email provider rejected the message with status {0}")]
    Rejected(u16),
}

/// A validated contact submission ready for dispatch.
#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub commentary: String,
    pub contribution: Option<String>,
    pub attachment_urls: Vec<String>,
}

/// Sends contact messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &ContactMessage, correlation_id: &str) -> Result<(), EmailError>;
}

#[derive(Serialize)]
struct EmailAttachment<'a> {
    path: &'a str,
    filename: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    reply_to: &'a str,
    subject: String,
    text: String,
    attachments: Vec<EmailAttachment<'a>>,
}

/// Resend HTTP API mailer.
pub struct ResendMailer {
    http: reqwest::Client,
    config: EmailConfig,
}

impl ResendMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &ContactMessage, correlation_id: &str) -> Result<(), EmailError> {
        let attachments = message
            .attachment_urls
            .iter()
            .map(|url| EmailAttachment {
                path: url,
                filename: url
                    .rsplit('/')
                    .next()
                    .unwrap_or("attachment")
                    .to_string(),
            })
            .collect();

        let contribution = message.contribution.as_deref().unwrap_or("none");
        let body = SendRequest {
            from: &self.config.from,
            to: vec![&self.config.to],
            reply_to: &message.email,
            subject: format!("Website contact - {}", message.name),
            text: format!(
                "{} ({}) wrote: {}\n\nContribution: {}",
                message.name, message.email, message.commentary, contribution
            ),
            attachments,
        };

        let response = self
            .http
            .post(format!("{}/emails", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(correlation_id, status = status.as_u16(), detail = %detail, "email send rejected");
            return Err(EmailError::Rejected(status.as_u16()));
        }

        debug!(correlation_id, "email dispatched");
        Ok(())
    }
}
