//! Lease based leader election on top of an agency store.
//!
//! Candidates race for one key holding `{"data": <leader payload>, "ttl": <unix seconds>}`.
//! Claims are guarded by conditional writes: an empty key for the first claim,
//! an unchanged `ttl` field for renewals and takeovers of expired leases.
//! Correctness assumes the participants' clocks agree up to a margin well
//! below the lease duration.

mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

mod config;
pub use config::{ElectionConfig, MIN_LEASE};

mod errors;
pub use errors::{ElectionError, Result};

pub mod election_metrics;

mod elector;
pub use elector::{ElectionStatus, Elector, ElectorHandle, LeaderElectionState};

mod leader_cell;
pub use leader_cell::{ElectionValue, LeaderElectionCell, LeaderUpdate};

mod record;
pub use record::LeaderRecord;
