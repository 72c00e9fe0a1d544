use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ScraperConfig;
use crate::models::{RawMarkup, Readiness, SourceConfig};
use crate::utils::error::FetchError;

/// Turns a source into rendered page markup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<RawMarkup, FetchError>;
}

/// Renders each source in its own headless Chrome session.
pub struct ChromeFetcher {
    config: ScraperConfig,
}

/// One browser process and tab. Dropping it closes the tab and then the browser.
struct RenderSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl RenderSession {
    fn open(launch_options: LaunchOptions<'static>, timeout: Duration) -> Result<Self, String> {
        let browser =
            Browser::new(launch_options).map_err(|e| format!("Failed to launch browser: {}", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| format!("Failed to create tab: {}", e))?;
        tab.set_default_timeout(timeout);

        Ok(Self {
            tab,
            _browser: browser,
        })
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            tracing::debug!("Failed to close tab: {}", e);
        }
    }
}

impl ChromeFetcher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    pub(crate) fn launch_options(&self) -> Result<LaunchOptions<'static>, String> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(self.config.sandbox)
            .idle_browser_timeout(self.deadline())
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| format!("Failed to create launch options: {}", e))?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }

    /// Hard limit for a whole fetch: session start, navigation and readiness.
    fn deadline(&self) -> Duration {
        self.config.fetch_timeout() * 2
    }

    fn render(
        launch_options: LaunchOptions<'static>,
        config: &ScraperConfig,
        source: &SourceConfig,
    ) -> Result<RawMarkup, FetchError> {
        let start_time = Instant::now();
        let timeout = config.fetch_timeout();

        let session = RenderSession::open(launch_options, timeout).map_err(|cause| {
            FetchError::Session {
                source_name: source.name.clone(),
                cause,
            }
        })?;
        let tab = &session.tab;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| FetchError::Session {
                source_name: source.name.clone(),
                cause: format!("Failed to set user agent: {}", e),
            })?;

        tab.navigate_to(&source.url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| FetchError::Navigation {
                source_name: source.name.clone(),
                url: source.url.clone(),
                cause: e.to_string(),
            })?;

        if let Readiness::Selector { selector } = &source.readiness {
            tab.wait_for_element_with_custom_timeout(selector, timeout)
                .map_err(|e| FetchError::Readiness {
                    source_name: source.name.clone(),
                    predicate: source.readiness.to_string(),
                    timeout,
                    cause: e.to_string(),
                })?;
        }

        let html = tab.get_content().map_err(|e| FetchError::Capture {
            source_name: source.name.clone(),
            cause: e.to_string(),
        })?;

        let final_url = {
            let url = tab.get_url();
            if url.is_empty() {
                source.url.clone()
            } else {
                url
            }
        };

        Ok(RawMarkup {
            source_name: source.name.clone(),
            html,
            final_url,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<RawMarkup, FetchError> {
        let launch_options = self.launch_options().map_err(|cause| FetchError::Session {
            source_name: source.name.clone(),
            cause,
        })?;
        let deadline = self.deadline();

        tracing::debug!(source = %source.name, "Fetching {}", source.url);

        let config = self.config.clone();
        let task_source = source.clone();
        let task = tokio::task::spawn_blocking(move || {
            Self::render(launch_options, &config, &task_source)
        });

        let markup = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(FetchError::Task {
                    source_name: source.name.clone(),
                    cause: e.to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::Timeout {
                    source_name: source.name.clone(),
                    timeout: deadline,
                })
            }
        };

        tracing::info!(
            source = %source.name,
            response_time_ms = markup.response_time_ms,
            "Fetched {} bytes from {}",
            markup.html.len(),
            markup.final_url
        );
        Ok(markup)
    }
}
