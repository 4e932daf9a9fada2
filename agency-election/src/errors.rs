use agency_core::agency::AgencyError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ElectionError>;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("Agency error: {0}")]
    Agency(#[from] AgencyError),

    #[error("Election operation cancelled")]
    Cancelled,

    #[error("Agency call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Leader record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid election configuration: {0}")]
    InvalidConfig(String),
}

impl ElectionError {
    /// True when a conditional write lost against a concurrent writer.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, ElectionError::Agency(e) if e.is_precondition_failed())
    }
}
