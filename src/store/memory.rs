use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{grow_header, row_for_header, ListingStore, StoreSnapshot};
use crate::models::Listing;
use crate::utils::error::StoreError;

/// Process-local store with the same table semantics as the durable one.
pub struct MemoryStore {
    table: RwLock<StoreSnapshot>,
    locator: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_table(StoreSnapshot::default())
    }

    /// Seeds the store with an existing table, e.g. one edited by hand.
    pub fn with_table(table: StoreSnapshot) -> Self {
        Self {
            table: RwLock::new(table),
            locator: "memory://listings".to_string(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    pub async fn row_count(&self) -> usize {
        self.table.read().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.table.read().await.clone())
    }

    async fn append(&self, listings: &[Listing]) -> Result<(), StoreError> {
        if listings.is_empty() {
            return Ok(());
        }

        let mut table = self.table.write().await;
        let added = grow_header(&mut table.header);
        if !added.is_empty() {
            for row in table.rows.iter_mut() {
                row.extend(added.iter().map(|_| String::new()));
            }
        }

        let rows: Vec<Vec<String>> = listings
            .iter()
            .map(|listing| row_for_header(&table.header, listing))
            .collect();
        table.rows.extend(rows);
        Ok(())
    }

    fn locator(&self) -> String {
        self.locator.clone()
    }
}
