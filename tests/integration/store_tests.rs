use super::*;
use listing_watcher::models::LISTING_COLUMNS;
use listing_watcher::SqliteStore;
use sqlx::sqlite::SqlitePoolOptions;

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("listings.db").display())
}

#[tokio::test]
async fn test_sqlite_store_survives_restart_without_duplicates() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = database_url(&dir);
    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.serve(
        "site1",
        results_page(&[
            ("Keizersgracht 1", "/homes/a", "€ 450.000"),
            ("Prinsengracht 2", "/homes/b", "€ 475.000"),
        ]),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    let store = Arc::new(SqliteStore::connect(&url).await?);
    let first = pipeline(
        fetcher.clone(),
        vec![site("site1")],
        store.clone(),
        notifier.clone(),
    )
    .run_once()
    .await?;
    assert_eq!(first.new_count, 2);
    assert_eq!(first.store_locator, url);
    store.close().await;

    // A new process sees what the previous one wrote.
    let reopened = Arc::new(SqliteStore::connect(&url).await?);
    let second = pipeline(
        fetcher.clone(),
        vec![site("site1")],
        reopened.clone(),
        notifier.clone(),
    )
    .run_once()
    .await?;
    assert_eq!(second.new_count, 0);

    let snapshot = reopened.snapshot().await?;
    assert_eq!(snapshot.header, LISTING_COLUMNS.to_vec());
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.value(0, "size"), Some("60 m²"));
    assert_eq!(notifier.sent().len(), 1);
    assert!(notifier.sent()[0].1.ends_with(&url));
    Ok(())
}

#[tokio::test]
async fn test_existing_table_with_fewer_columns_is_extended() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = database_url(&dir);

    // A table written by an older setup: no size, label or timestamp columns.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("{}?mode=rwc", url))
        .await?;
    sqlx::query(r#"CREATE TABLE listings ("address" TEXT, "URL" TEXT, "price" TEXT)"#)
        .execute(&pool)
        .await?;
    sqlx::query(
        r#"INSERT INTO listings VALUES ('Keizersgracht 1', 'https://site1.example/homes/a', '€ 450.000')"#,
    )
    .execute(&pool)
    .await?;
    pool.close().await;

    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.serve(
        "site1",
        results_page(&[
            ("Keizersgracht 1", "/homes/a", "€ 450.000"),
            ("Prinsengracht 2", "/homes/b", "€ 475.000"),
        ]),
    );
    let store = Arc::new(SqliteStore::connect(&url).await?);

    let summary = pipeline(
        fetcher,
        vec![site("site1")],
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .run_once()
    .await?;
    assert_eq!(summary.new_count, 1);

    let snapshot = store.snapshot().await?;
    assert_eq!(
        snapshot.header,
        vec!["address", "URL", "price", "size", "energy_label", "timestamp"]
    );
    assert_eq!(snapshot.value(0, "size"), Some(""));
    assert_eq!(snapshot.value(0, "timestamp"), Some(""));
    assert_eq!(snapshot.value(1, "address"), Some("Prinsengracht 2"));
    assert_eq!(snapshot.value(1, "size"), Some("60 m²"));
    assert!(!snapshot.value(1, "timestamp").unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_repeated_runs_after_column_growth_stay_deduplicated() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = database_url(&dir);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("{}?mode=rwc", url))
        .await?;
    sqlx::query(r#"CREATE TABLE listings ("address" TEXT, "URL" TEXT, "price" TEXT)"#)
        .execute(&pool)
        .await?;
    sqlx::query(
        r#"INSERT INTO listings VALUES ('Keizersgracht 1', 'https://site1.example/homes/a', '€ 450.000')"#,
    )
    .execute(&pool)
    .await?;
    pool.close().await;

    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.serve(
        "site1",
        results_page(&[
            ("Keizersgracht 1", "/homes/a", "€ 450.000"),
            ("Prinsengracht 2", "/homes/b", "€ 475.000"),
        ]),
    );
    let store = Arc::new(SqliteStore::connect(&url).await?);
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = pipeline(fetcher, vec![site("site1")], store.clone(), notifier.clone());

    assert_eq!(pipeline.run_once().await?.new_count, 1);
    assert_eq!(pipeline.run_once().await?.new_count, 0);
    assert_eq!(pipeline.run_once().await?.new_count, 0);

    let snapshot = store.snapshot().await?;
    assert_eq!(
        snapshot.urls().collect::<Vec<_>>(),
        vec![
            "https://site1.example/homes/a",
            "https://site1.example/homes/b"
        ]
    );
    assert_eq!(notifier.sent().len(), 1);
    Ok(())
}
