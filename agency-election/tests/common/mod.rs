//! Shared helpers for the `agency-election` integration tests.
//!
//! Provides a [`FaultyAgency`] wrapping the in-memory agency so tests can
//! inject store failures, hang calls, cancel in the middle of a write and
//! inspect committed transactions.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agency_core::agency::{Agency, AgencyError, AgencyKey, Result, Transaction};
use agency_election::{ElectionConfig, LeaderElectionCell, ManualClock};
use agency_store::MemoryAgency;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Wall clock start of every test, in milliseconds (unix second 1000).
pub const NOW_MS: u64 = 1_000_000;

pub const LEASE: Duration = Duration::from_secs(2);

pub fn leader_key() -> AgencyKey {
    AgencyKey::new(["a", "leader"])
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW_MS))
}

/// A cell on `["a", "leader"]` with a 2s lease, driven by `clock`.
pub fn new_cell(clock: &Arc<ManualClock>) -> LeaderElectionCell<String> {
    LeaderElectionCell::with_config(
        leader_key(),
        ElectionConfig::with_lease(LEASE),
        clock.clone(),
    )
    .expect("valid election config")
}

/// In-memory agency with failure injection and call accounting.
#[derive(Default)]
pub struct FaultyAgency {
    pub inner: MemoryAgency,
    read_failures: Mutex<VecDeque<AgencyError>>,
    write_failures: Mutex<VecDeque<AgencyError>>,
    cancel_on_write: Mutex<Option<CancellationToken>>,
    hang_reads: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
    committed: Mutex<Vec<Transaction>>,
}

impl FaultyAgency {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_read(&self, err: AgencyError) {
        self.read_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_write(&self, err: AgencyError) {
        self.write_failures.lock().unwrap().push_back(err);
    }

    /// Cancel `token` while the next write is in flight.
    pub fn cancel_during_next_write(&self, token: CancellationToken) {
        *self.cancel_on_write.lock().unwrap() = Some(token);
    }

    pub fn hang_reads(&self) {
        self.hang_reads.store(true, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> Vec<Transaction> {
        self.committed.lock().unwrap().clone()
    }

    /// The raw leader record, if any.
    pub async fn record(&self) -> Option<Value> {
        self.inner.read_key(&leader_key()).await.ok()
    }
}

#[async_trait]
impl Agency for FaultyAgency {
    async fn read_key(&self, key: &AgencyKey) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.hang_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let injected = self.read_failures.lock().unwrap().pop_front();
        if let Some(err) = injected {
            return Err(err);
        }
        let value = self.inner.read_key(key).await;
        // let concurrent candidates observe the same state before anyone writes
        tokio::task::yield_now().await;
        value
    }

    async fn write_transaction(&self, trx: Transaction) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let token = self.cancel_on_write.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
        }
        let injected = self.write_failures.lock().unwrap().pop_front();
        if let Some(err) = injected {
            return Err(err);
        }
        self.inner.write_transaction(trx.clone()).await?;
        self.committed.lock().unwrap().push(trx);
        Ok(())
    }
}
