use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Row};

use super::{grow_header, row_for_header, ListingStore, StoreSnapshot};
use crate::models::{Listing, LISTING_COLUMNS};
use crate::utils::error::StoreError;

const TABLE: &str = "listings";

/// Listing table in SQLite. Every column is TEXT with an empty-string
/// default, so rows written before a column existed read back as "".
pub struct SqliteStore {
    pool: SqlitePool,
    locator: String,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", database_url, e)))?
            .create_if_missing(true);

        // A single long-lived connection keeps `sqlite::memory:` databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", database_url, e)))?;

        let store = Self {
            pool,
            locator: database_url.to_string(),
        };
        store.ensure_table().await?;

        tracing::debug!("Opened listing store at {}", database_url);
        Ok(store)
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let columns = LISTING_COLUMNS
            .iter()
            .map(|column| format!("{} TEXT NOT NULL DEFAULT ''", quote_ident(column)))
            .collect::<Vec<_>>()
            .join(", ");

        sqlx::query(&format!("CREATE TABLE IF NOT EXISTS {} ({})", TABLE, columns))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn read_header(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(TABLE)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect()
    }

    async fn read_rows(
        conn: &mut SqliteConnection,
        header: &[String],
    ) -> Result<Vec<Vec<String>>, sqlx::Error> {
        // Not cached: a prepared statement keeps the column count it had
        // before `ADD COLUMN`.
        let select = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(header),
            TABLE
        );
        let rows = sqlx::query(&select)
            .persistent(false)
            .fetch_all(conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (0..header.len())
                    .map(|i| {
                        row.try_get::<Option<String>, _>(i)
                            .ok()
                            .flatten()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect())
    }

    /// Reads the table without creating or changing anything. A missing
    /// database file or table reads as an empty store.
    pub async fn read_only_snapshot(database_url: &str) -> Result<StoreSnapshot, StoreError> {
        let unavailable = |e: sqlx::Error| StoreError::Unavailable(format!("{}: {}", database_url, e));

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(unavailable)?
            .read_only(true)
            .create_if_missing(false);
        if !options.clone().get_filename().exists() {
            tracing::debug!("No listing store at {}, reading it as empty", database_url);
            return Ok(StoreSnapshot::default());
        }

        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(unavailable)?;
        let header = Self::read_header(&mut conn).await.map_err(unavailable)?;
        let snapshot = if header.is_empty() {
            StoreSnapshot::default()
        } else {
            let rows = Self::read_rows(&mut conn, &header)
                .await
                .map_err(unavailable)?;
            StoreSnapshot { header, rows }
        };

        if let Err(e) = conn.close().await {
            tracing::debug!("Failed to close read-only connection: {}", e);
        }
        Ok(snapshot)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let unavailable = |e: sqlx::Error| StoreError::Unavailable(e.to_string());

        let mut conn = self.pool.acquire().await.map_err(unavailable)?;
        let header = Self::read_header(&mut conn).await.map_err(unavailable)?;
        if header.is_empty() {
            return Err(StoreError::Unavailable(format!("table `{}` is missing", TABLE)));
        }

        let rows = Self::read_rows(&mut conn, &header)
            .await
            .map_err(unavailable)?;
        Ok(StoreSnapshot { header, rows })
    }

    async fn append(&self, listings: &[Listing]) -> Result<(), StoreError> {
        if listings.is_empty() {
            return Ok(());
        }
        let write = |e: sqlx::Error| StoreError::Write(e.to_string());

        let mut tx = self.pool.begin().await.map_err(write)?;

        let mut header = Self::read_header(&mut tx).await.map_err(write)?;
        for column in grow_header(&mut header) {
            tracing::info!("Adding column {} to listing store", column);
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} TEXT NOT NULL DEFAULT ''",
                TABLE,
                quote_ident(&column)
            ))
            .execute(&mut *tx)
            .await
            .map_err(write)?;
        }

        let placeholders = vec!["?"; header.len()].join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            TABLE,
            column_list(&header),
            placeholders
        );

        for listing in listings {
            let mut query = sqlx::query(&insert).persistent(false);
            for value in row_for_header(&header, listing) {
                query = query.bind(value);
            }
            query.execute(&mut *tx).await.map_err(write)?;
        }

        tx.commit().await.map_err(write)?;
        tracing::debug!("Appended {} listings to {}", listings.len(), self.locator);
        Ok(())
    }

    fn locator(&self) -> String {
        self.locator.clone()
    }
}

fn column_list(header: &[String]) -> String {
    header
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
