//! Scan job payloads exchanged with the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed scan request, rejected before it reaches the queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pairId must be a positive integer, got {0}")]
    InvalidPairId(i64),
    #[error("malformed scan request: {0}")]
    Malformed(String),
}

/// ScanTrigger records who asked for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTrigger {
    Manual,
    Scheduled,
}

impl std::fmt::Display for ScanTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanTrigger::Manual => write!(f, "manual"),
            ScanTrigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Request for an on-demand scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScanJobRequest {
    /// Scan only this pair. None scans a batch of active pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<i64>,
    /// Doubles the batch size of a batch scan.
    #[serde(default)]
    pub force: bool,
}

impl ScanJobRequest {
    /// Parses and validates a request body.
    pub fn from_json(body: &str) -> Result<Self, ValidationError> {
        let request: ScanJobRequest =
            serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.pair_id {
            Some(id) if id <= 0 => Err(ValidationError::InvalidPairId(id)),
            _ => Ok(()),
        }
    }
}

/// Payload stored with every queued scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<i64>,
    #[serde(default)]
    pub force: bool,
    pub trigger: ScanTrigger,
    pub requested_at: DateTime<Utc>,
}

impl ScanJobPayload {
    pub fn manual(request: &ScanJobRequest) -> Self {
        Self {
            pair_id: request.pair_id,
            force: request.force,
            trigger: ScanTrigger::Manual,
            requested_at: Utc::now(),
        }
    }

    pub fn scheduled(requested_at: DateTime<Utc>) -> Self {
        Self {
            pair_id: None,
            force: false,
            trigger: ScanTrigger::Scheduled,
            requested_at,
        }
    }
}

/// Completion payload of a scan job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobResult {
    pub pairs_scanned: u32,
    pub opportunities_found: u32,
    pub closed_opportunities: u64,
    pub duration_ms: u64,
    /// Per-pair failures in batch order.
    pub errors: Vec<String>,
}

/// Externally visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Job handle returned on enqueue and on status lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Rough duration estimate in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u64>,
}
