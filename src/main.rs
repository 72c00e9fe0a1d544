use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use listing_watcher::config::{LoggingConfig, MetricsConfig};
use listing_watcher::plugins::{Notification, NotifierManager};
use listing_watcher::{AppConfig, Pipeline, RunScheduler};

#[derive(Debug, Parser)]
#[command(author, version, about = "Watches real-estate listing sites and reports new listings")]
struct Cli {
    /// Configuration file, layered over config/default and config/local
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline once and print the run report
    Run {
        /// Work on an in-memory copy of the store and log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run on the configured cron schedule until interrupted
    Watch,
    /// List the configured sources
    Sources,
    /// Send a test message through every configured notifier
    TestNotifiers {
        /// Only check connectivity, do not send anything
        #[arg(long)]
        check_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command {
        Command::Run { dry_run, json } => run(&config, dry_run, json).await,
        Command::Watch => watch(&config).await,
        Command::Sources => list_sources(&config),
        Command::TestNotifiers { check_only } => test_notifiers(&config, check_only).await,
    }
}

/// Console logging, plus daily rolling files when a log directory is configured.
/// The returned guard flushes the file writer on drop.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("listing_watcher=info"))?;

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

fn init_metrics(metrics: &MetricsConfig) -> Result<()> {
    if !metrics.enabled {
        return Ok(());
    }

    let addr: SocketAddr = metrics.listen.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to start metrics exporter")?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

async fn run(config: &AppConfig, dry_run: bool, json: bool) -> Result<()> {
    let pipeline = if dry_run {
        Pipeline::dry_run_from_config(config).await?
    } else {
        Pipeline::from_config(config).await?
    };

    info!("Starting run over {} sources", pipeline.sources().len());
    let summary = pipeline.run_once().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}

async fn watch(config: &AppConfig) -> Result<()> {
    init_metrics(&config.metrics)?;

    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    info!(
        "Starting Listing Watcher with {} sources",
        pipeline.sources().len()
    );

    let mut scheduler = RunScheduler::new(pipeline, config.scheduler.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.shutdown().await?;

    let stats = scheduler.stats().await;
    info!(
        "{} runs ({} succeeded, {} aborted, {} ticks skipped)",
        stats.runs, stats.successes, stats.aborts, stats.skipped_ticks
    );
    Ok(())
}

fn list_sources(config: &AppConfig) -> Result<()> {
    for source in config.resolve_sources()? {
        println!("{:<12} {}", source.name, source.url);
        println!("{:<12} ready when: {}", "", source.readiness);
    }
    Ok(())
}

async fn test_notifiers(config: &AppConfig, check_only: bool) -> Result<()> {
    let manager = NotifierManager::from_config(&config.notifications)?;
    for (kind, name, description) in manager.describe() {
        println!("{:<8} {}: {}", kind, name, description);
    }
    println!();
    let mut failed = 0;

    if check_only {
        for (notifier, result) in manager.test_all().await {
            match result {
                Ok(true) => println!("{}: reachable", notifier),
                Ok(false) => {
                    failed += 1;
                    println!("{}: unreachable", notifier);
                }
                Err(e) => {
                    failed += 1;
                    println!("{}: {}", notifier, e);
                }
            }
        }
    } else {
        let notification = Notification::new(
            "Listing Watcher test",
            "This is a test message. Notifications are set up correctly.",
        );
        for (notifier, result) in manager.notify_each(&notification).await {
            match result {
                Ok(result) => println!("{}: delivered to {}", notifier, result.delivered),
                Err(e) => {
                    failed += 1;
                    println!("{}: {}", notifier, e);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} notifier(s) failed", failed);
    }
    Ok(())
}
