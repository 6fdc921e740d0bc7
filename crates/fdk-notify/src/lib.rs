//! Outbound push notifications.
//!
//! Delivery is at-most-once and best-effort: a failed push is logged and
//! forgotten. Nothing in the dispatch flow ever waits on a delivery
//! acknowledgment or rolls back because a notification could not be sent —
//! callers fan out through [`push_all`] *after* their database work
//! committed.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One push message. `data` is an opaque string map handed to the mobile
/// client (shipment ids, action hints).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Pluggable push sink.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, recipient_token: &str, notification: &Notification) -> Result<()>;
}

/// Fan a notification out to every token, logging failures and reporting
/// how many pushes succeeded. Never returns an error.
pub async fn push_all(
    notifier: &dyn Notifier,
    tokens: &[String],
    notification: &Notification,
) -> usize {
    let mut delivered = 0;
    for token in tokens {
        match notifier.push(token, notification).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(error = %e, "push notification failed"),
        }
    }
    delivered
}

// ---------------------------------------------------------------------------
// NoopNotifier
// ---------------------------------------------------------------------------

/// Used when no push credentials are configured.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn push(&self, _recipient_token: &str, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FcmNotifier
// ---------------------------------------------------------------------------

/// FCM legacy HTTP sender.
///
/// The endpoint is injectable so tests can point it at a local stub; the
/// server key is passed in by the caller (read from configuration) and never
/// logged.
pub struct FcmNotifier {
    http: reqwest::Client,
    server_key: String,
    endpoint: String,
}

impl FcmNotifier {
    pub fn new(server_key: String, endpoint: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client construction must not fail");
        Self {
            http,
            server_key,
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for FcmNotifier {
    async fn push(&self, recipient_token: &str, notification: &Notification) -> Result<()> {
        let payload = serde_json::json!({
            "to": recipient_token,
            "notification": {
                "title": notification.title,
                "body": notification.body,
            },
            "data": notification.data,
            "android": {
                "priority": "high",
                "notification": { "channel_id": "high_importance_channel" }
            },
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .context("fcm request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("fcm http error status={} body={}", status.as_u16(), body));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
