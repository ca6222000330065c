//! Cron-based background scheduling

mod error;
mod sweep;

pub use error::{SchedulerError, SchedulerResult};
pub use sweep::{SubmissionSweep, SubmissionSweepConfig};
