use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::adapters;
use crate::extractor::RecordExtractor;
use crate::models::{Readiness, SourceConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub notifications: NotificationsConfig,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Upper bound for navigation plus readiness wait, per source.
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
}

impl ScraperConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            chrome_path: None,
            headless: true,
            sandbox: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    /// Shown in notifications instead of the database url when set.
    pub locator: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://listings.db".to_string(),
            locator: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drop repeated urls within one run before diffing against the store.
    pub dedupe_candidates: bool,
    pub subject: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedupe_candidates: true,
            subject: "New Property Listings Added".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub email: Option<SmtpConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub recipients: Vec<String>,
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_address: String::new(),
            from_name: Some("Listing Watcher".to_string()),
            recipients: Vec::new(),
            starttls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: "Listing Watcher".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six fields, seconds first.
    pub cron: String,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 9 * * *".to_string(),
            run_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Daily rolling log files are written here when set.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "listing-watcher.log".to_string(),
        }
    }
}

/// A configured source: either a built-in preset, optionally renamed or
/// pointed at another search url, or a fully custom definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourceEntry {
    Preset {
        preset: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
    Custom(SourceConfig),
}

impl SourceEntry {
    pub fn preset(name: &str) -> Self {
        SourceEntry::Preset {
            preset: name.to_string(),
            name: None,
            url: None,
        }
    }

    pub fn resolve(&self) -> Result<SourceConfig, ConfigError> {
        match self {
            SourceEntry::Preset { preset, name, url } => {
                let mut source = adapters::preset(preset, url.as_deref()).ok_or_else(|| {
                    ConfigError::Message(format!(
                        "Unknown source preset '{}' (known: {})",
                        preset,
                        adapters::PRESETS.join(", ")
                    ))
                })?;
                if let Some(name) = name {
                    source.name = name.clone();
                }
                Ok(source)
            }
            SourceEntry::Custom(source) => Ok(source.clone()),
        }
    }
}

impl AppConfig {
    /// Defaults, then `config/default`, `config/{RUN_MODE}`, `config/local`,
    /// the explicit file, and finally `WATCHER__*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("WATCHER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notifications.email.recipients"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Configured sources, or both built-in presets when none are listed.
    pub fn source_entries(&self) -> Vec<SourceEntry> {
        if self.sources.is_empty() {
            adapters::PRESETS
                .iter()
                .map(|name| SourceEntry::preset(name))
                .collect()
        } else {
            self.sources.clone()
        }
    }

    pub fn resolve_sources(&self) -> Result<Vec<SourceConfig>, ConfigError> {
        self.source_entries().iter().map(SourceEntry::resolve).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Scraper fetch_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.store.database_url.trim().is_empty() {
            return Err(ConfigError::Message("Store database_url must not be empty".into()));
        }

        let sources = self.resolve_sources()?;
        let mut names = HashSet::new();
        for source in &sources {
            validate_source(source)?;
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate source name '{}'",
                    source.name
                )));
            }
        }

        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message(
                "Invalid cron expression in scheduler.cron (expected 6 fields, seconds first)".into(),
            ));
        }

        if let Some(email) = &self.notifications.email {
            if email.host.trim().is_empty() {
                return Err(ConfigError::Message("Email host must not be empty".into()));
            }
            if email.port == 0 {
                return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
            }
            if email.from_address.trim().is_empty() {
                return Err(ConfigError::Message("Email from_address must not be empty".into()));
            }
            if email.recipients.iter().all(|r| r.trim().is_empty()) {
                return Err(ConfigError::Message(
                    "Email recipients must contain at least one address".into(),
                ));
            }
        }

        if let Some(discord) = &self.notifications.discord {
            if !is_discord_webhook(&discord.webhook_url) {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if self.metrics.enabled && self.metrics.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "Metrics listen address '{}' is not a socket address",
                self.metrics.listen
            )));
        }

        Ok(())
    }
}

fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    if source.name.trim().is_empty() {
        return Err(ConfigError::Message("Source name must not be empty".into()));
    }

    match Url::parse(&source.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ConfigError::Message(format!(
                "Source '{}' has invalid URL '{}'",
                source.name, source.url
            )))
        }
    }

    if let Readiness::Selector { selector } = &source.readiness {
        if scraper::Selector::parse(selector).is_err() {
            return Err(ConfigError::Message(format!(
                "Source '{}' has invalid readiness selector '{}'",
                source.name, selector
            )));
        }
    }

    RecordExtractor::for_source(source).map_err(|e| ConfigError::Message(e.to_string()))?;
    Ok(())
}

pub(crate) fn is_discord_webhook(url: &str) -> bool {
    url.starts_with("https://discord.com/api/webhooks/")
        || url.starts_with("https://discordapp.com/api/webhooks/")
}

/// Six whitespace separated fields, seconds first, as the scheduler expects.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
    })
}
