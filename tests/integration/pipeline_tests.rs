use super::*;
use chrono::{TimeZone, Utc};
use listing_watcher::models::Listing;
use listing_watcher::{MemoryStore, StoreSnapshot, SyncError};

fn known_listing() -> Listing {
    Listing {
        address: "Keizersgracht 1".to_string(),
        url: "https://site1.example/homes/a".to_string(),
        price: "€ 450.000".to_string(),
        size: Some("60 m²".to_string()),
        energy_label: None,
        observed_at: Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap(),
    }
}

fn store_with(listings: &[Listing]) -> Arc<MemoryStore> {
    let header: Vec<String> = listing_watcher::models::LISTING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = listings
        .iter()
        .map(|listing| listing.to_row().into_iter().map(|(_, v)| v).collect())
        .collect();
    Arc::new(MemoryStore::with_table(StoreSnapshot { header, rows }))
}

fn two_sites(fetcher: &FixtureFetcher) {
    fetcher.serve(
        "site1",
        results_page(&[
            ("Keizersgracht 1", "/homes/a", "€ 450.000"),
            ("Prinsengracht 2", "/homes/b", "€ 475.000"),
        ]),
    );
    fetcher.serve(
        "site2",
        results_page(&[("Herengracht 3", "/homes/c", "€ 399.000")]),
    );
}

#[tokio::test]
async fn test_only_unseen_listings_are_appended_and_announced() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    two_sites(&fetcher);
    let store = store_with(&[known_listing()]);
    let notifier = Arc::new(RecordingNotifier::default());

    let pipeline = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    );
    let summary = pipeline.run_once().await?;

    assert_eq!(summary.total_candidates, 3);
    assert_eq!(summary.new_count, 2);
    assert!(summary.persisted);
    assert!(summary.per_source_errors.is_empty());

    let snapshot = store.snapshot().await?;
    assert_eq!(
        snapshot.urls().collect::<Vec<_>>(),
        vec![
            "https://site1.example/homes/a",
            "https://site1.example/homes/b",
            "https://site2.example/homes/c",
        ]
    );
    assert_eq!(snapshot.value(1, "address"), Some("Prinsengracht 2"));
    assert_eq!(snapshot.value(2, "price"), Some("€ 399.000"));
    assert_eq!(snapshot.value(2, "energy_label"), Some(""));

    // Both new rows share the run's timestamp.
    assert_eq!(snapshot.value(1, "timestamp"), snapshot.value(2, "timestamp"));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "New Property Listings Added");
    assert_eq!(
        sent[0].1,
        "Added 2 new listings to the listing store.\n\nmemory://listings"
    );
    Ok(())
}

#[tokio::test]
async fn test_second_run_over_same_pages_changes_nothing() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    two_sites(&fetcher);
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    );

    let first = pipeline.run_once().await?;
    assert_eq!(first.new_count, 3);

    let second = pipeline.run_once().await?;
    assert_eq!(second.total_candidates, 3);
    assert_eq!(second.new_count, 0);
    assert!(!second.persisted);

    assert_eq!(store.row_count().await, 3);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(fetcher.fetches().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_failing_site_does_not_hold_back_the_others() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    two_sites(&fetcher);
    fetcher.take_down("site1", "connection reset");
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    )
    .run_once()
    .await?;

    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.per_source_errors.len(), 1);
    assert!(summary.per_source_errors[0].to_string().contains("site1"));
    assert!(summary.sources[0].error.is_some());
    assert_eq!(summary.sources[1].extracted, 1);

    let snapshot = store.snapshot().await?;
    assert_eq!(
        snapshot.urls().collect::<Vec<_>>(),
        vec!["https://site2.example/homes/c"]
    );
    assert_eq!(notifier.sent().len(), 1);

    // Once the site is back its listings are picked up.
    two_sites(&fetcher);
    let summary = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    )
    .run_once()
    .await?;
    assert_eq!(summary.new_count, 2);
    assert_eq!(store.row_count().await, 3);
    Ok(())
}

#[tokio::test]
async fn test_append_order_follows_configured_sources_not_completion() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.serve_after(
        "slow",
        results_page(&[("Damrak 1", "/homes/slow", "€ 1")]),
        Duration::from_millis(150),
    );
    fetcher.serve("fast", results_page(&[("Rokin 2", "/homes/fast", "€ 2")]));
    let store = Arc::new(MemoryStore::new());

    pipeline(
        fetcher.clone(),
        vec![site("slow"), site("fast")],
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .run_once()
    .await?;

    let snapshot = store.snapshot().await?;
    assert_eq!(
        snapshot.urls().collect::<Vec<_>>(),
        vec![
            "https://slow.example/homes/slow",
            "https://fast.example/homes/fast"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_sources_are_fetched_concurrently() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    for name in ["one", "two", "three"] {
        fetcher.serve_after(name, results_page(&[]), Duration::from_millis(200));
    }

    let started = tokio::time::Instant::now();
    let summary = pipeline(
        fetcher.clone(),
        vec![site("one"), site("two"), site("three")],
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::default()),
    )
    .run_once()
    .await?;

    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(summary.sources.len(), 3);
    assert_eq!(summary.new_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_notification_keeps_appended_listings() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    two_sites(&fetcher);
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::failing());
    let pipeline = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    );

    let summary = pipeline.run_once().await?;
    assert!(summary.persisted);
    assert!(summary.notify_error.is_some());
    assert!(summary.to_string().contains("Notification failed"));
    assert_eq!(store.row_count().await, 3);

    // The listings were stored, so they are not announced again.
    let again = pipeline.run_once().await?;
    assert_eq!(again.new_count, 0);
    assert_eq!(notifier.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_every_site_down_sends_nothing() -> anyhow::Result<()> {
    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.take_down("site1", "timeout");
    fetcher.take_down("site2", "timeout");
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(
        fetcher,
        vec![site("site1"), site("site2")],
        store.clone(),
        notifier.clone(),
    )
    .run_once()
    .await?;

    assert_eq!(summary.per_source_errors.len(), 2);
    assert_eq!(summary.new_count, 0);
    assert_eq!(store.row_count().await, 0);
    assert!(notifier.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_store_without_identity_column_aborts_before_fetching() {
    let fetcher = Arc::new(FixtureFetcher::new());
    two_sites(&fetcher);
    let store = Arc::new(MemoryStore::with_table(StoreSnapshot {
        header: vec!["address".to_string(), "price".to_string()],
        rows: vec![vec!["Foo".to_string(), "€ 1".to_string()]],
    }));
    let notifier = Arc::new(RecordingNotifier::default());

    let result = pipeline(
        fetcher.clone(),
        vec![site("site1"), site("site2")],
        store,
        notifier.clone(),
    )
    .run_once()
    .await;

    assert!(matches!(result, Err(SyncError::StoreUnavailable(_))));
    assert!(fetcher.fetches().is_empty());
    assert!(notifier.sent().is_empty());
}
