//! Signed webhook notification sender.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use ppob_types::{NotificationError, NotificationSender};

use crate::signing::{SIGNATURE_HEADER, sign_payload};

/// Recipient used by `notify`.
pub const BROADCAST_RECIPIENT: &str = "*";

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    message: &'a str,
    sent_at: DateTime<Utc>,
}

/// Posts notifications as JSON, signed with HMAC-SHA256 when a secret is set.
pub struct WebhookNotifier {
    url: String,
    secret: Option<String>,
    timeout: Duration,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            url: url.into(),
            secret,
            timeout: Duration::from_secs(10),
            http: Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serialized body and its signature header value, if signing.
    fn encode(&self, recipient: &str, message: &str) -> Result<(Vec<u8>, Option<String>), NotificationError> {
        let payload = WebhookPayload {
            recipient,
            message,
            sent_at: Utc::now(),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        let signature = self
            .secret
            .as_deref()
            .map(|secret| sign_payload(&body, secret))
            .transpose()
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        Ok((body, signature))
    }
}

#[async_trait]
impl NotificationSender for WebhookNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotificationError> {
        let (body, signature) = self.encode(recipient, message)?;

        let mut req = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(signature) = signature {
            req = req.header(SIGNATURE_HEADER, signature);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            debug!(recipient, "webhook delivered");
            Ok(())
        } else {
            let message = resp.text().await.unwrap_or_default();
            warn!(recipient, status = status.as_u16(), "webhook rejected");
            Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn notify(&self, message: &str) -> Result<(), NotificationError> {
        self.send(BROADCAST_RECIPIENT, message).await
    }
}
