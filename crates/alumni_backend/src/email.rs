//! Transactional email client (Resend-compatible `/emails` API).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use alumni_core::ports::{EmailSender, PortError, PortResult};
use alumni_core::types::{EmailMessage, EmailReceipt};

use crate::identity::classify_transport_error;

pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com";

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

pub struct HttpEmailSender {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(
        api_url: &str,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

fn classify_email_error(status: StatusCode, body: &str) -> PortError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("email provider returned {}", status));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        PortError::Unavailable(message)
    } else {
        PortError::Rejected(message)
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_email(&self, message: &EmailMessage) -> PortResult<EmailReceipt> {
        let body = SendEmailBody {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;
        if !status.is_success() {
            return Err(classify_email_error(status, &text));
        }

        let provider_response = serde_json::from_str(&text)
            .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
        debug!(to = %message.to, "email accepted by provider");
        Ok(EmailReceipt {
            success: true,
            provider_response,
        })
    }
}
