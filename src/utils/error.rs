use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Failure to turn a source into rendered markup. Recovered per source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("{source_name}: failed to open rendering session: {cause}")]
    Session { source_name: String, cause: String },

    #[error("{source_name}: navigation to {url} failed: {cause}")]
    Navigation {
        source_name: String,
        url: String,
        cause: String,
    },

    #[error("{source_name}: page not ready within {timeout:?} (waiting for {predicate}): {cause}")]
    Readiness {
        source_name: String,
        predicate: String,
        timeout: Duration,
        cause: String,
    },

    #[error("{source_name}: failed to capture rendered document: {cause}")]
    Capture { source_name: String, cause: String },

    #[error("{source_name}: fetch exceeded deadline of {timeout:?}")]
    Timeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("{source_name}: rendering task failed: {cause}")]
    Task { source_name: String, cause: String },
}

impl FetchError {
    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Session { source_name, .. }
            | FetchError::Navigation { source_name, .. }
            | FetchError::Readiness { source_name, .. }
            | FetchError::Capture { source_name, .. }
            | FetchError::Timeout { source_name, .. }
            | FetchError::Task { source_name, .. } => source_name,
        }
    }
}

/// A single malformed listing item. The item is skipped, the page is not.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("{source_name} item #{index}: missing required field `{field}`")]
    MissingField {
        source_name: String,
        index: usize,
        field: &'static str,
    },

    #[error("{source_name} item #{index}: cannot resolve url {raw:?}: {cause}")]
    InvalidUrl {
        source_name: String,
        index: usize,
        raw: String,
        cause: String,
    },
}

/// Extraction rules that cannot be compiled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("{source_name}: invalid CSS selector `{selector}`: {message}")]
    InvalidSelector {
        source_name: String,
        selector: String,
        message: String,
    },

    #[error("{source_name}: invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        source_name: String,
        pattern: String,
        message: String,
    },

    #[error("{source_name}: invalid base url `{url}`: {message}")]
    InvalidBaseUrl {
        source_name: String,
        url: String,
        message: String,
    },
}

/// Why a source contributed nothing to a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store write failed: {0}")]
    Write(String),

    #[error("Store schema invalid: {0}")]
    Schema(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("{notifier}: invalid configuration: {message}")]
    Config { notifier: String, message: String },

    #[error("{notifier}: delivery failed: {message}")]
    Delivery { notifier: String, message: String },

    #[error("{}", describe_failures(.0))]
    Failed(Vec<NotifyError>),
}

fn describe_failures(failures: &[NotifyError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run-level failures. Anything here aborts the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Run aborted, listing store unreadable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Run aborted, appending {count} new listings failed: {source}")]
    Persist {
        count: usize,
        #[source]
        source: StoreError,
    },
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
