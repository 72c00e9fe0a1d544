use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::config::{AppConfig, SyncConfig};
use crate::dedup::{dedupe_candidates, diff_urls};
use crate::extractor::{Extraction, RecordExtractor};
use crate::models::{format_timestamp, SourceConfig};
use crate::plugins::notifiers::LogNotifier;
use crate::plugins::{NotifierManager, NotifySink};
use crate::scraper::{ChromeFetcher, PageFetcher};
use crate::store::{ListingStore, MemoryStore, SqliteStore};
use crate::utils::error::{AppError, NotifyError, SourceError, SyncError};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Drop repeated urls within one run's candidates, first seen wins.
    pub dedupe_candidates: bool,
    pub subject: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            dedupe_candidates: config.dedupe_candidates,
            subject: config.subject.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub extracted: usize,
    /// Malformed items that were skipped.
    pub skipped: usize,
    pub error: Option<String>,
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    #[serde(serialize_with = "errors_as_strings")]
    pub per_source_errors: Vec<SourceError>,
    pub total_candidates: usize,
    pub duplicates_dropped: usize,
    pub new_count: usize,
    pub persisted: bool,
    pub store_locator: String,
    #[serde(serialize_with = "error_as_string")]
    pub notify_error: Option<NotifyError>,
}

fn errors_as_strings<S: Serializer>(errors: &[SourceError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(|e| e.to_string()))
}

fn error_as_string<S: Serializer>(error: &Option<NotifyError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl RunSummary {
    fn new(run_id: Uuid, observed_at: DateTime<Utc>, store_locator: String) -> Self {
        Self {
            run_id,
            observed_at,
            sources: Vec::new(),
            per_source_errors: Vec::new(),
            total_candidates: 0,
            duplicates_dropped: 0,
            new_count: 0,
            persisted: false,
            store_locator,
            notify_error: None,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} at {} UTC",
            self.run_id,
            format_timestamp(&self.observed_at)
        )?;
        for source in &self.sources {
            match &source.error {
                Some(error) => writeln!(f, "  {}: failed: {}", source.name, error)?,
                None if source.skipped > 0 => writeln!(
                    f,
                    "  {}: {} listings ({} malformed skipped)",
                    source.name, source.extracted, source.skipped
                )?,
                None => writeln!(f, "  {}: {} listings", source.name, source.extracted)?,
            }
        }
        write!(f, "Candidates: {}", self.total_candidates)?;
        if self.duplicates_dropped > 0 {
            write!(f, " ({} repeated within the run)", self.duplicates_dropped)?;
        }
        writeln!(f)?;
        if self.persisted {
            writeln!(f, "New listings: {} (appended to {})", self.new_count, self.store_locator)?;
        } else {
            writeln!(f, "New listings: {}", self.new_count)?;
        }
        if let Some(error) = &self.notify_error {
            writeln!(f, "Notification failed: {}", error)?;
        }
        Ok(())
    }
}

pub fn notification_body(new_count: usize, store_locator: &str) -> String {
    format!(
        "Added {} new listings to the listing store.\n\n{}",
        new_count, store_locator
    )
}

/// Fetch, extract, diff, append and notify for a set of sources.
pub struct SyncCoordinator {
    fetcher: Arc<dyn PageFetcher>,
    options: SyncOptions,
}

impl SyncCoordinator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, options: SyncOptions) -> Self {
        Self { fetcher, options }
    }

    /// One run. Only an unreadable store or a failed append aborts it;
    /// source failures and notification failures end up in the summary.
    pub async fn run(
        &self,
        sources: &[SourceConfig],
        store: &dyn ListingStore,
        notifier: &dyn NotifySink,
    ) -> Result<RunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let observed_at = Utc::now().trunc_subsecs(0);
        counter!("listing_watcher_runs_total").increment(1);
        tracing::info!(%run_id, sources = sources.len(), "Starting run");

        let snapshot = store
            .snapshot()
            .await
            .and_then(|snapshot| snapshot.check_identity_column().map(|_| snapshot))
            .map_err(|e| {
                tracing::error!(%run_id, "Listing store unavailable, aborting run: {}", e);
                SyncError::StoreUnavailable(e)
            })?;

        let outcomes = join_all(
            sources
                .iter()
                .map(|source| self.fetch_and_extract(source, observed_at)),
        )
        .await;

        let mut summary = RunSummary::new(run_id, observed_at, store.locator());
        let mut candidates = Vec::new();
        for (source, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Ok(extraction) => {
                    counter!("listing_watcher_listings_extracted_total", "source" => source.name.clone())
                        .increment(extraction.listings.len() as u64);
                    tracing::info!(
                        source = %source.name,
                        extracted = extraction.listings.len(),
                        skipped = extraction.errors.len(),
                        "Extracted listings"
                    );
                    summary.sources.push(SourceReport {
                        name: source.name.clone(),
                        extracted: extraction.listings.len(),
                        skipped: extraction.errors.len(),
                        error: None,
                    });
                    candidates.extend(extraction.listings);
                }
                Err(e) => {
                    counter!("listing_watcher_fetch_failures_total", "source" => source.name.clone())
                        .increment(1);
                    tracing::warn!(source = %source.name, "Source contributed nothing: {}", e);
                    summary.sources.push(SourceReport {
                        name: source.name.clone(),
                        extracted: 0,
                        skipped: 0,
                        error: Some(e.to_string()),
                    });
                    summary.per_source_errors.push(e);
                }
            }
        }

        summary.total_candidates = candidates.len();
        if self.options.dedupe_candidates {
            let (kept, dropped) = dedupe_candidates(candidates);
            candidates = kept;
            summary.duplicates_dropped = dropped;
        }

        let new = diff_urls(candidates, snapshot.urls());
        summary.new_count = new.len();
        if new.is_empty() {
            tracing::info!(%run_id, candidates = summary.total_candidates, "No new listings");
            return Ok(summary);
        }

        store.append(&new).await.map_err(|e| {
            tracing::error!(%run_id, "Failed to append {} new listings: {}", new.len(), e);
            SyncError::Persist {
                count: new.len(),
                source: e,
            }
        })?;
        summary.persisted = true;
        counter!("listing_watcher_new_listings_total").increment(new.len() as u64);
        tracing::info!(%run_id, new = new.len(), "Appended new listings to {}", summary.store_locator);

        let body = notification_body(new.len(), &summary.store_locator);
        if let Err(e) = notifier.send(&self.options.subject, &body).await {
            counter!("listing_watcher_notify_failures_total").increment(1);
            tracing::warn!(%run_id, "Notification failed, listings stay stored: {}", e);
            summary.notify_error = Some(e);
        }

        Ok(summary)
    }

    /// Rules are compiled before the fetch so a broken source never opens a browser.
    async fn fetch_and_extract(
        &self,
        source: &SourceConfig,
        observed_at: DateTime<Utc>,
    ) -> Result<Extraction, SourceError> {
        let extractor = RecordExtractor::for_source(source)?;
        let markup = self.fetcher.fetch(source).await?;
        Ok(extractor.extract_markup(&markup, observed_at))
    }
}

/// Everything a run needs, built once from configuration.
pub struct Pipeline {
    coordinator: SyncCoordinator,
    sources: Vec<SourceConfig>,
    store: Arc<dyn ListingStore>,
    notifier: Arc<dyn NotifySink>,
}

impl Pipeline {
    pub fn new(
        coordinator: SyncCoordinator,
        sources: Vec<SourceConfig>,
        store: Arc<dyn ListingStore>,
        notifier: Arc<dyn NotifySink>,
    ) -> Self {
        Self {
            coordinator,
            sources,
            store,
            notifier,
        }
    }

    /// Headless Chrome fetcher, SQLite store and the configured notifiers.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let sources = config.resolve_sources()?;

        let mut store = SqliteStore::connect(&config.store.database_url).await?;
        if let Some(locator) = &config.store.locator {
            store = store.with_locator(locator.clone());
        }

        let notifier = NotifierManager::from_config(&config.notifications)?;
        let fetcher = ChromeFetcher::new(config.scraper.clone());

        Ok(Self::new(
            SyncCoordinator::new(Arc::new(fetcher), SyncOptions::from(&config.sync)),
            sources,
            Arc::new(store),
            Arc::new(notifier),
        ))
    }

    /// Same sources and fetcher as `from_config`, but appends land in an
    /// in-memory copy of the store and notifications go to the log.
    pub async fn dry_run_from_config(config: &AppConfig) -> Result<Self, AppError> {
        let sources = config.resolve_sources()?;

        let locator = config
            .store
            .locator
            .clone()
            .unwrap_or_else(|| config.store.database_url.clone());
        let snapshot = SqliteStore::read_only_snapshot(&config.store.database_url).await?;
        tracing::info!("Dry run against a copy of {} ({} rows)", locator, snapshot.len());

        let mut notifier = NotifierManager::new();
        notifier.register(Box::new(LogNotifier::new()));
        let fetcher = ChromeFetcher::new(config.scraper.clone());

        Ok(Self::new(
            SyncCoordinator::new(Arc::new(fetcher), SyncOptions::from(&config.sync)),
            sources,
            Arc::new(MemoryStore::with_table(snapshot).with_locator(locator)),
            Arc::new(notifier),
        ))
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub async fn run_once(&self) -> Result<RunSummary, SyncError> {
        self.coordinator
            .run(&self.sources, self.store.as_ref(), self.notifier.as_ref())
            .await
    }
}
