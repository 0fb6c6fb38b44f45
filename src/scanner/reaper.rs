//! Expiry of stale opportunities.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{OpportunityStatus, StatusFilter};
use crate::storage::{ScanStore, StorageError};

/// TtlReaper moves open opportunities to EXPIRED once they pass their expiry
/// time or have not been touched for a whole TTL.
pub struct TtlReaper {
    store: Arc<dyn ScanStore>,
}

impl TtlReaper {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self { store }
    }

    /// Expires stale records in one statement and returns how many changed.
    pub async fn expire_stale(&self, ttl_seconds: u64) -> Result<u64, StorageError> {
        let now = Utc::now();
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        let filter = StatusFilter {
            statuses: OpportunityStatus::OPEN.to_vec(),
            expires_at_or_before: Some(now),
            updated_before: now.checked_sub_signed(ttl),
        };

        let expired = self
            .store
            .update_opportunities_status(&filter, OpportunityStatus::Expired)
            .await?;

        if expired > 0 {
            info!(expired, ttl_seconds, "Expired stale opportunities");
        } else {
            debug!(ttl_seconds, "No stale opportunities");
        }

        Ok(expired)
    }
}
