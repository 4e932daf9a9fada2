use agency_core::agency::Agency;
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::election_metrics::{LEADER_ELECTION_ERRORS_TOTAL, LEADER_ELECTION_STATE};
use crate::errors::{ElectionError, Result};
use crate::leader_cell::{ElectionValue, LeaderElectionCell};

const RESIGN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderElectionState {
    NoLeader,
    Leading,
    Following,
}

/// What the elector last learned about the election.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionStatus<T> {
    pub state: LeaderElectionState,
    /// Payload of the current leader, if one is known.
    pub leader: Option<T>,
}

impl<T> Default for ElectionStatus<T> {
    fn default() -> Self {
        Self {
            state: LeaderElectionState::NoLeader,
            leader: None,
        }
    }
}

/// Owns one election cell and drives it on the cadence the cell recommends.
///
/// Other tasks follow the outcome through the [`ElectorHandle`] returned by
/// [`Elector::new`]. When the run is cancelled the elector resigns.
pub struct Elector<T, A: ?Sized> {
    cell: LeaderElectionCell<T>,
    agency: Arc<A>,
    candidate: T,
    status: watch::Sender<ElectionStatus<T>>,
}

impl<T, A> Elector<T, A>
where
    T: ElectionValue,
    A: Agency + ?Sized,
{
    pub fn new(
        cell: LeaderElectionCell<T>,
        agency: Arc<A>,
        candidate: T,
    ) -> (Self, ElectorHandle<T>) {
        let (status, rx) = watch::channel(ElectionStatus::default());
        let elector = Self {
            cell,
            agency,
            candidate,
            status,
        };
        (elector, ElectorHandle { status: rx })
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(key = %self.cell.key(), lease = ?self.cell.lease(), "starting leader election");

        loop {
            let delay = match self
                .cell
                .update(&cancel, self.agency.as_ref(), self.candidate.clone())
                .await
            {
                Ok(update) => {
                    let state = if update.is_leader {
                        LeaderElectionState::Leading
                    } else {
                        LeaderElectionState::Following
                    };
                    self.publish(state, Some(update.value));
                    update.next_update
                }
                Err(ElectionError::Cancelled) => break,
                Err(e) if cancel.is_cancelled() => {
                    debug!(error = %e, "leader election update interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    counter!(LEADER_ELECTION_ERRORS_TOTAL.name).increment(1);
                    warn!(key = %self.cell.key(), error = %e, "leader election update failed");
                    // leadership is unknown until the next successful update
                    self.publish(LeaderElectionState::NoLeader, None);
                    self.cell.config().error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shutdown().await
    }

    async fn shutdown(&mut self) -> Result<()> {
        // the run token is already cancelled, resignation gets its own
        let token = CancellationToken::new();
        let mut attempt = 1;
        let outcome = loop {
            match self.cell.resign(&token, self.agency.as_ref()).await {
                Ok(()) => break Ok(()),
                Err(e) if attempt < RESIGN_ATTEMPTS => {
                    warn!(key = %self.cell.key(), attempt, error = %e, "failed to resign leadership, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.cell.config().min_update_delay).await;
                }
                Err(e) => {
                    error!(key = %self.cell.key(), error = %e, "giving up resigning leadership");
                    break Err(e);
                }
            }
        };

        self.publish(LeaderElectionState::NoLeader, None);
        info!(key = %self.cell.key(), "leader election stopped");
        outcome
    }

    fn publish(&self, state: LeaderElectionState, leader: Option<T>) {
        let next = ElectionStatus { state, leader };
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            // 0 = Following/NoLeader, 1 = Leading
            let value = match state {
                LeaderElectionState::Leading => 1.0,
                _ => 0.0,
            };
            gauge!(LEADER_ELECTION_STATE.name).set(value);
            debug!(key = %self.cell.key(), ?state, "leader election state changed");
        }
    }
}

/// Read side of an [`Elector`].
#[derive(Debug, Clone)]
pub struct ElectorHandle<T> {
    status: watch::Receiver<ElectionStatus<T>>,
}

impl<T: Clone> ElectorHandle<T> {
    pub fn status(&self) -> ElectionStatus<T> {
        self.status.borrow().clone()
    }

    pub fn is_leader(&self) -> bool {
        self.status.borrow().state == LeaderElectionState::Leading
    }

    /// Wait for the next status change. Returns false once the elector is gone.
    pub async fn changed(&mut self) -> bool {
        self.status.changed().await.is_ok()
    }
}
