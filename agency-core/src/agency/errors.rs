use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgencyError>;

#[derive(Error, Debug)]
pub enum AgencyError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request redirected to agency leader at {0}")]
    Redirected(String),

    #[error("Unexpected agency response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid agency response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgencyError {
    /// Returns true when the read found nothing stored at the requested key.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, AgencyError::KeyNotFound(_))
    }

    /// Returns true when a transaction was rejected because one of its
    /// conditions did not hold at commit time.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, AgencyError::PreconditionFailed(_))
    }
}
