use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Listing, URL_COLUMN};
use crate::utils::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Full contents of the listing table at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub header: Vec<String>,
    /// Each row has exactly `header.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|h| h == column)
    }

    /// Non-empty values of the URL column, in row order. Duplicates are kept.
    pub fn urls(&self) -> impl Iterator<Item = &str> + '_ {
        let index = self.column_index(URL_COLUMN);
        self.rows
            .iter()
            .filter_map(move |row| index.and_then(|i| row.get(i)))
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }

    /// Rows that still read as listings. Hand-edited rows that do not are skipped.
    pub fn listings(&self) -> Vec<Listing> {
        self.rows
            .iter()
            .filter_map(|row| Listing::from_row(&self.header, row))
            .collect()
    }

    /// A table holding rows must have the identity column, otherwise every
    /// candidate would look new.
    pub fn check_identity_column(&self) -> Result<(), StoreError> {
        if self.is_empty() || self.column_index(URL_COLUMN).is_some() {
            Ok(())
        } else {
            Err(StoreError::Schema(format!(
                "{} rows but no `{}` column",
                self.len(),
                URL_COLUMN
            )))
        }
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(|v| v.as_str())
    }
}

/// Durable, append-only table of every listing seen so far.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError>;

    /// Appends all listings in one operation. Columns the table lacks are
    /// added; cells a row does not fill are empty strings.
    async fn append(&self, listings: &[Listing]) -> Result<(), StoreError>;

    /// Human-usable pointer to the store, included in notifications.
    fn locator(&self) -> String;
}

/// Appends to `header` every column of the listing schema it lacks, in
/// schema order, and returns the ones added.
pub(crate) fn grow_header(header: &mut Vec<String>) -> Vec<String> {
    let mut added = Vec::new();
    for column in crate::models::LISTING_COLUMNS {
        if !header.iter().any(|h| h == column) {
            header.push(column.to_string());
            added.push(column.to_string());
        }
    }
    added
}

/// Lays out a listing's values under `header`; columns it does not carry stay empty.
pub(crate) fn row_for_header(header: &[String], listing: &Listing) -> Vec<String> {
    let values = listing.to_row();
    header
        .iter()
        .map(|column| {
            values
                .iter()
                .find(|(name, _)| *name == column.as_str())
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .collect()
}
