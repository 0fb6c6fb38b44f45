//! Storage interfaces and implementations for pairs, opportunities,
//! scan statistics and runtime settings.

mod sqlite;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{NewOpportunity, Opportunity, OpportunityStatus, Pair, ScanStats, StatusFilter};
use async_trait::async_trait;
use std::collections::HashMap;

/// ScanStore is everything the scan pipeline reads from or writes to
/// persistent storage.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Active pairs, least recently updated first.
    async fn find_active_pairs(&self, limit: u32) -> Result<Vec<Pair>, StorageError>;

    /// A pair by ID regardless of its active flag.
    async fn find_pair_by_id(&self, id: i64) -> Result<Option<Pair>, StorageError>;

    /// Persists an opportunity and marks its pair as recently updated.
    async fn create_opportunity(&self, opp: &NewOpportunity) -> Result<Opportunity, StorageError>;

    /// Moves every row matching the filter to `status` in one statement.
    /// Returns the number of rows changed.
    async fn update_opportunities_status(
        &self,
        filter: &StatusFilter,
        status: OpportunityStatus,
    ) -> Result<u64, StorageError>;

    /// Appends a scan statistics row.
    async fn create_scan_stats(&self, stats: &ScanStats) -> Result<(), StorageError>;

    /// Values of the requested keys. Keys without an active row are absent.
    async fn find_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>, StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
