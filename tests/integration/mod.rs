// Shared fixtures for the integration tests: scripted pages, a recording
// notifier and a small listing site layout.

pub mod pipeline_tests;
pub mod store_tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use listing_watcher::models::{ExtractionRules, FieldRule, RawMarkup, Readiness, SourceConfig};
use listing_watcher::plugins::NotifySink;
use listing_watcher::scraper::PageFetcher;
use listing_watcher::store::ListingStore;
use listing_watcher::utils::error::{FetchError, NotifyError};
use listing_watcher::{Pipeline, SyncCoordinator, SyncOptions};

/// What a fixture site serves on the next fetch.
#[derive(Clone)]
pub enum Page {
    Ok { html: String, delay: Duration },
    Down(String),
}

/// Serves scripted pages by source name and counts fetches.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: Mutex<HashMap<String, Page>>,
    fetches: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, source: &str, html: String) {
        self.serve_after(source, html, Duration::ZERO);
    }

    pub fn serve_after(&self, source: &str, html: String, delay: Duration) {
        self.pages
            .lock()
            .unwrap()
            .insert(source.to_string(), Page::Ok { html, delay });
    }

    pub fn take_down(&self, source: &str, cause: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(source.to_string(), Page::Down(cause.to_string()));
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<RawMarkup, FetchError> {
        self.fetches.lock().unwrap().push(source.name.clone());
        let page = self.pages.lock().unwrap().get(&source.name).cloned();

        match page {
            Some(Page::Ok { html, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(RawMarkup::new(source.name.clone(), html))
            }
            Some(Page::Down(cause)) => Err(FetchError::Navigation {
                source_name: source.name.clone(),
                url: source.url.clone(),
                cause,
            }),
            None => Err(FetchError::Navigation {
                source_name: source.name.clone(),
                url: source.url.clone(),
                cause: "no fixture page".to_string(),
            }),
        }
    }
}

/// Keeps every notification; optionally fails each delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifySink for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        if self.fail {
            return Err(NotifyError::Delivery {
                notifier: "recording".to_string(),
                message: "mailbox full".to_string(),
            });
        }
        Ok(())
    }
}

/// A listing site at `https://{name}.example` with one `li.listing` per home.
pub fn site(name: &str) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        url: format!("https://{}.example/search", name),
        base_url: None,
        readiness: Readiness::Selector {
            selector: "ul.results".to_string(),
        },
        rules: ExtractionRules {
            item: "li.listing".to_string(),
            address: FieldRule::text("h2"),
            url: FieldRule::attr(Some("a.details"), "href"),
            price: FieldRule::text("span.price"),
            size: Some(FieldRule::text("span.size")),
            energy_label: Some(FieldRule::text("span.label")),
        },
    }
}

/// Renders `(address, path, price)` triples as a results page.
pub fn results_page(homes: &[(&str, &str, &str)]) -> String {
    let items: String = homes
        .iter()
        .map(|(address, path, price)| {
            format!(
                r#"<li class="listing"><h2>{}</h2><a class="details" href="{}">details</a><span class="price">{}</span><span class="size">60 m²</span></li>"#,
                address, path, price
            )
        })
        .collect();
    format!("<html><body><ul class=\"results\">{}</ul></body></html>", items)
}

pub fn pipeline(
    fetcher: Arc<FixtureFetcher>,
    sources: Vec<SourceConfig>,
    store: Arc<dyn ListingStore>,
    notifier: Arc<RecordingNotifier>,
) -> Pipeline {
    Pipeline::new(
        SyncCoordinator::new(fetcher, SyncOptions::default()),
        sources,
        store,
        notifier,
    )
}
