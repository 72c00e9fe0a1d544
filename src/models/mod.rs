pub mod listing;
pub mod source;

// Re-exports for convenience
pub use listing::*;
pub use source::*;

/// Markup of a fully rendered listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarkup {
    pub source_name: String,
    pub html: String,
    /// Location after redirects.
    pub final_url: String,
    pub response_time_ms: u64,
}

impl RawMarkup {
    pub fn new(source_name: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            html: html.into(),
            final_url: String::new(),
            response_time_ms: 0,
        }
    }
}
