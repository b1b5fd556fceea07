//! Engine error kinds.
//!
//! Only user-level failures surface as errors; logic errors are logged and
//! the offending record marked so it cannot misfire again, and condition
//! evaluation is total (mismatches yield Unknown, never an error).

use thiserror::Error;

pub use crate::bfi::ScheduleError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("identifier {0:?} is empty or malformed")]
    BadIdentifier(String),

    #[error("term {0:?} is still referenced")]
    StillReferenced(String),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("{0:?} is not a delay operator")]
    NotADelay(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
