pub mod adapters;
pub mod config;
pub mod dedup;
pub mod extractor;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::{Listing, RawMarkup, SourceConfig};
pub use scheduler::RunScheduler;
pub use store::{ListingStore, MemoryStore, SqliteStore, StoreSnapshot};
pub use sync::{Pipeline, RunSummary, SyncCoordinator, SyncOptions};
pub use utils::error::{AppError, SyncError};

pub type Result<T> = std::result::Result<T, AppError>;
