use async_trait::async_trait;

use super::notifiers::{DiscordNotifier, EmailNotifier, LogNotifier};
use super::traits::{Notification, NotificationResult, NotifierPlugin, NotifySink};
use crate::config::NotificationsConfig;
use crate::utils::error::NotifyError;

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Fans a notification out to every registered notifier, in registration order.
#[derive(Default)]
pub struct NotifierManager {
    notifiers: Vec<NotifierPluginBox>,
}

impl NotifierManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the configured transports; falls back to the log notifier when
    /// none are configured.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, NotifyError> {
        let mut manager = Self::new();

        if let Some(email) = &config.email {
            manager.register(Box::new(EmailNotifier::new(email)?));
        }
        if let Some(discord) = &config.discord {
            manager.register(Box::new(DiscordNotifier::new(discord)?));
        }
        if manager.is_empty() {
            tracing::info!("No notification transport configured, notifications go to the log");
            manager.register(Box::new(LogNotifier::new()));
        }

        Ok(manager)
    }

    pub fn register(&mut self, plugin: NotifierPluginBox) {
        tracing::debug!("Registered notifier {} ({})", plugin.name(), plugin.plugin_type());
        self.notifiers.push(plugin);
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn list_notifier_types(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.plugin_type()).collect()
    }

    /// `(type, name, description)` of every notifier, in registration order.
    pub fn describe(&self) -> Vec<(&str, &str, &str)> {
        self.notifiers
            .iter()
            .map(|n| (n.plugin_type(), n.name(), n.description()))
            .collect()
    }

    /// Delivers to each notifier in turn and reports every outcome.
    pub async fn notify_each(
        &self,
        notification: &Notification,
    ) -> Vec<(String, Result<NotificationResult, NotifyError>)> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push((
                notifier.plugin_type().to_string(),
                notifier.notify(notification).await,
            ));
        }
        results
    }

    /// Sends to all notifiers even when some fail; the error lists every failure.
    pub async fn notify_all(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut failures = Vec::new();

        for (notifier, result) in self.notify_each(notification).await {
            match result {
                Ok(result) => tracing::info!(
                    notifier = %notifier,
                    delivered = result.delivered,
                    "Notification sent"
                ),
                Err(e) => {
                    tracing::warn!(notifier = %notifier, "Notification failed: {}", e);
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Failed(failures))
        }
    }

    /// Connection check per notifier, in registration order.
    pub async fn test_all(&self) -> Vec<(String, Result<bool, NotifyError>)> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push((
                notifier.plugin_type().to_string(),
                notifier.test_connection().await,
            ));
        }
        results
    }
}

#[async_trait]
impl NotifySink for NotifierManager {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.notify_all(&Notification::new(subject, body)).await
    }
}
