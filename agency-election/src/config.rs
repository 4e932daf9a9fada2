use std::time::Duration;

use crate::errors::{ElectionError, Result};

/// Lease expiries are stored with one second resolution, so shorter leases
/// could expire right after being written.
pub const MIN_LEASE: Duration = Duration::from_secs(2);

/// Tuning of one election cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    /// How long a successful claim stays valid without renewal.
    /// Must be much larger than the clock skew between participants.
    pub lease: Duration,
    /// Upper bound of every single agency round trip.
    pub call_timeout: Duration,
    /// Shortest delay ever recommended between two updates, also the pause
    /// before retrying a lost race.
    pub min_update_delay: Duration,
    /// Pause of the elector loop after a failed update.
    pub error_backoff: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(15),
            call_timeout: Duration::from_secs(10),
            min_update_delay: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl ElectionConfig {
    pub fn with_lease(lease: Duration) -> Self {
        Self {
            lease,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease < MIN_LEASE {
            return Err(ElectionError::InvalidConfig(format!(
                "lease {:?} is shorter than the minimum of {:?}",
                self.lease, MIN_LEASE
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(ElectionError::InvalidConfig(
                "call_timeout must be greater than zero".to_string(),
            ));
        }
        if self.min_update_delay.is_zero() || self.min_update_delay >= self.lease / 2 {
            return Err(ElectionError::InvalidConfig(format!(
                "min_update_delay {:?} must be non zero and below half the lease",
                self.min_update_delay
            )));
        }
        Ok(())
    }
}
