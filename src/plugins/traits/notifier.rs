use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::NotifyError;

/// Message announcing new listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Subject and body as one block of text, for transports without a subject line.
    pub fn as_text(&self) -> String {
        format!("**{}**\n{}", self.subject, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub message_id: Option<String>,
    /// Number of recipients that accepted the message.
    pub delivered: usize,
}

/// A transport that can deliver notifications (email, Discord, ...).
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;
    fn description(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult, NotifyError>;

    /// Checks that the transport is reachable without delivering anything
    /// when the transport allows it.
    async fn test_connection(&self) -> Result<bool, NotifyError>;
}

/// Where a run reports new listings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}
