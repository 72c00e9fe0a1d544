use async_trait::async_trait;

use crate::plugins::traits::{Notification, NotificationResult, NotifierPlugin};
use crate::utils::error::NotifyError;

/// Writes notifications to the log. Used when no transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifierPlugin for LogNotifier {
    fn name(&self) -> &str {
        "Log Notifier"
    }

    fn plugin_type(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Writes new-listing summaries to the application log"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult, NotifyError> {
        tracing::info!(subject = %notification.subject, "{}", notification.body);
        Ok(NotificationResult {
            message_id: None,
            delivered: 1,
        })
    }

    async fn test_connection(&self) -> Result<bool, NotifyError> {
        Ok(true)
    }
}
