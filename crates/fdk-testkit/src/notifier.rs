//! Push sink that records instead of delivering.

use std::sync::Mutex;

use anyhow::Result;

use fdk_notify::{Notification, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub token: String,
    pub notification: Notification,
}

#[derive(Default)]
pub struct CapturingNotifier {
    pushes: Mutex<Vec<PushRecord>>,
}

impl CapturingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    /// Tokens that received a push whose title contains `needle`.
    pub fn tokens_for(&self, needle: &str) -> Vec<String> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.notification.title.contains(needle))
            .map(|p| p.token.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.pushes.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Notifier for CapturingNotifier {
    async fn push(&self, recipient_token: &str, notification: &Notification) -> Result<()> {
        self.pushes.lock().unwrap().push(PushRecord {
            token: recipient_token.to_string(),
            notification: notification.clone(),
        });
        Ok(())
    }
}
