//! Error reporting for jobs that exhausted their retries.

mod reporter;
mod telegram;

pub use reporter::{
    ErrorReporter, FailureReport, LogReporter, MultiReporter, NotificationError, format_failure,
};
pub use telegram::TelegramReporter;
