use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::plugins::traits::{Notification, NotificationResult, NotifierPlugin};
use crate::utils::error::NotifyError;

const NOTIFIER: &str = "email";

/// Sends each notification as a plain-text mail, one message per recipient.
pub struct EmailNotifier {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

fn config_error(message: impl Into<String>) -> NotifyError {
    NotifyError::Config {
        notifier: NOTIFIER.to_string(),
        message: message.into(),
    }
}

fn delivery_error(message: impl Into<String>) -> NotifyError {
    NotifyError::Delivery {
        notifier: NOTIFIER.to_string(),
        message: message.into(),
    }
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let address: Address = config
            .from_address
            .trim()
            .parse()
            .map_err(|e| config_error(format!("invalid from_address '{}': {}", config.from_address, e)))?;
        let from = Mailbox::new(config.from_name.clone(), address);

        let recipients = config
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(|r| {
                r.parse::<Mailbox>()
                    .map_err(|e| config_error(format!("invalid recipient '{}': {}", r, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(config_error("no recipients configured"));
        }

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| config_error(format!("invalid SMTP host '{}': {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            from,
            recipients,
            mailer: builder.build(),
        })
    }

    pub fn recipients(&self) -> &[Mailbox] {
        &self.recipients
    }

    fn build_message(&self, to: &Mailbox, notification: &Notification) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| delivery_error(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &str {
        NOTIFIER
    }

    fn description(&self) -> &str {
        "Sends new-listing summaries by email via SMTP"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult, NotifyError> {
        let mut delivered = 0;
        let mut failures = Vec::new();
        let mut message_id = None;

        for to in &self.recipients {
            let message = match self.build_message(to, notification) {
                Ok(message) => message,
                Err(e) => {
                    failures.push(format!("{}: {}", to, e));
                    continue;
                }
            };
            match self.mailer.send(message).await {
                Ok(response) => {
                    delivered += 1;
                    message_id = response.message().next().map(|line| line.to_string());
                    tracing::debug!("Email sent to {}", to);
                }
                Err(e) => {
                    tracing::warn!("Email to {} failed: {}", to, e);
                    failures.push(format!("{}: {}", to, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(delivery_error(failures.join(", ")));
        }

        Ok(NotificationResult {
            message_id,
            delivered,
        })
    }

    async fn test_connection(&self) -> Result<bool, NotifyError> {
        self.mailer
            .test_connection()
            .await
            .map_err(|e| delivery_error(e.to_string()))
    }
}
