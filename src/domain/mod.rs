//! Domain models for the scan pipeline.

mod job;
mod opportunity;
mod pair;
mod quote;
mod settings;
mod stats;

pub use job::{
    JobStatus, ScanJobPayload, ScanJobRequest, ScanJobResponse, ScanJobResult, ScanTrigger,
    ValidationError,
};
pub use opportunity::{NewOpportunity, Opportunity, OpportunityStatus, StatusFilter};
pub use pair::Pair;
pub use quote::Quote;
pub use settings::{RuntimeSettings, SETTING_KEYS};
pub use stats::ScanStats;
