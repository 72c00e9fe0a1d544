use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::{is_discord_webhook, DiscordConfig};
use crate::plugins::traits::{Notification, NotificationResult, NotifierPlugin};
use crate::utils::error::NotifyError;

const NOTIFIER: &str = "discord";

/// Discord rejects message content longer than this.
const MAX_CONTENT_CHARS: usize = 2000;

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> Result<Self, NotifyError> {
        if !is_discord_webhook(&config.webhook_url) {
            return Err(NotifyError::Config {
                notifier: NOTIFIER.to_string(),
                message: "Invalid Discord webhook URL format".to_string(),
            });
        }
        Ok(Self::with_endpoint(&config.webhook_url, &config.username))
    }

    /// Skips webhook url validation so tests can point at a local server.
    pub(crate) fn with_endpoint(webhook_url: &str, username: &str) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.to_string(),
            username: username.to_string(),
        }
    }

    fn create_webhook_payload(&self, notification: &Notification) -> serde_json::Value {
        let content: String = notification.as_text().chars().take(MAX_CONTENT_CHARS).collect();
        json!({
            "content": content,
            "username": self.username,
        })
    }

    fn delivery_error(message: impl Into<String>) -> NotifyError {
        NotifyError::Delivery {
            notifier: NOTIFIER.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        NOTIFIER
    }

    fn description(&self) -> &str {
        "Posts new-listing summaries to a Discord channel via webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult, NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.create_webhook_payload(notification))
            .send()
            .await
            .map_err(|e| Self::delivery_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::delivery_error(format!("HTTP {}: {}", status, body.trim())));
        }

        Ok(NotificationResult {
            message_id: None,
            delivered: 1,
        })
    }

    /// A GET on a webhook returns its metadata without posting anything.
    async fn test_connection(&self) -> Result<bool, NotifyError> {
        let response = self
            .client
            .get(&self.webhook_url)
            .send()
            .await
            .map_err(|e| Self::delivery_error(e.to_string()))?;
        Ok(response.status().is_success())
    }
}
