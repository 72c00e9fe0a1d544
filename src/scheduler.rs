use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, SchedulerConfig};
use crate::sync::{Pipeline, RunSummary};
use crate::utils::error::SyncError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleStats {
    pub cron_expression: String,
    pub job_id: Option<Uuid>,
    pub runs: u64,
    pub successes: u64,
    pub aborts: u64,
    /// Ticks that fired while a run was still in progress.
    pub skipped_ticks: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_new_count: Option<usize>,
    pub last_error: Option<String>,
}

impl ScheduleStats {
    fn record(&mut self, result: &Result<RunSummary, SyncError>) {
        self.runs += 1;
        self.last_run = Some(Utc::now());
        match result {
            Ok(summary) => {
                self.successes += 1;
                self.last_new_count = Some(summary.new_count);
                self.last_error = None;
            }
            Err(e) => {
                self.aborts += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// Runs the pipeline on a cron schedule, never two runs at once.
pub struct RunScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<Pipeline>,
    stats: Arc<RwLock<ScheduleStats>>,
    run_lock: Arc<Mutex<()>>,
    config: SchedulerConfig,
}

impl RunScheduler {
    pub async fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let stats = ScheduleStats {
            cron_expression: config.cron.clone(),
            ..ScheduleStats::default()
        };

        Ok(Self {
            scheduler,
            pipeline,
            stats: Arc::new(RwLock::new(stats)),
            run_lock: Arc::new(Mutex::new(())),
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        if !is_valid_cron(&self.config.cron) {
            return Err(anyhow::anyhow!(
                "Invalid cron expression '{}' (expected 6 fields, seconds first)",
                self.config.cron
            ));
        }

        let pipeline = Arc::clone(&self.pipeline);
        let stats = Arc::clone(&self.stats);
        let run_lock = Arc::clone(&self.run_lock);

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            let stats = Arc::clone(&stats);
            let run_lock = Arc::clone(&run_lock);

            Box::pin(async move {
                Self::execute(&pipeline, &stats, &run_lock).await;
            })
        })?;

        let job_id = self.scheduler.add(job).await?;
        self.stats.write().await.job_id = Some(job_id);
        self.scheduler.start().await?;
        tracing::info!("Run scheduler started with cron '{}'", self.config.cron);

        if self.config.run_on_start {
            let pipeline = Arc::clone(&self.pipeline);
            let stats = Arc::clone(&self.stats);
            let run_lock = Arc::clone(&self.run_lock);
            tokio::spawn(async move {
                Self::execute(&pipeline, &stats, &run_lock).await;
            });
        }

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        // Let an in-flight run finish its append before returning.
        let _guard = self.run_lock.lock().await;
        tracing::info!("Run scheduler shutdown");
        Ok(())
    }

    /// Runs immediately unless a run is in progress, in which case `None`.
    pub async fn run_now(&self) -> Option<Result<RunSummary, SyncError>> {
        Self::execute(&self.pipeline, &self.stats, &self.run_lock).await
    }

    pub async fn stats(&self) -> ScheduleStats {
        self.stats.read().await.clone()
    }

    async fn execute(
        pipeline: &Pipeline,
        stats: &RwLock<ScheduleStats>,
        run_lock: &Mutex<()>,
    ) -> Option<Result<RunSummary, SyncError>> {
        let Ok(_guard) = run_lock.try_lock() else {
            tracing::warn!("Previous run still in progress, skipping this tick");
            stats.write().await.skipped_ticks += 1;
            return None;
        };

        let start_time = tokio::time::Instant::now();
        let result = pipeline.run_once().await;

        match &result {
            Ok(summary) => tracing::info!(
                "Scheduled run finished in {}ms: {} new of {} candidates",
                start_time.elapsed().as_millis(),
                summary.new_count,
                summary.total_candidates
            ),
            Err(e) => tracing::error!("Scheduled run aborted: {}", e),
        }

        stats.write().await.record(&result);
        Some(result)
    }
}
