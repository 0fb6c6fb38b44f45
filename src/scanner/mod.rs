//! Scan pipeline: settings, detection, expiry, statistics and the worker pool
//! that drives them from the job queue.

mod context;
mod detector;
mod error;
mod pool;
mod reaper;
mod settings;
mod stats;
mod worker;

pub use context::{ScanContext, ScanOptions};
pub use detector::{OpportunityDetector, VenueQuote};
pub use error::{PairScanError, ScanError};
pub use pool::{PoolOptions, PoolStats, WorkerPool};
pub use reaper::TtlReaper;
pub use settings::SettingsProvider;
pub use stats::{PriceSummary, ScanTally, StatsRecorder};
pub use worker::ScanWorker;

#[cfg(test)]
mod tests;
