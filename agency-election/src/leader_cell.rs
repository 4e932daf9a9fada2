use agency_core::agency::{Agency, AgencyKey, Condition, ConditionsMap, KeyOp, Transaction};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::ElectionConfig;
use crate::election_metrics::{LEADER_ELECTION_CLAIMS_TOTAL, LEADER_ELECTION_LOST_RACES_TOTAL};
use crate::errors::{ElectionError, Result};
use crate::record::{LeaderRecord, KEY_DATA, KEY_TTL};

/// Payloads a leader can publish: comparable, serializable and with an
/// "absent" default.
pub trait ElectionValue:
    Serialize + DeserializeOwned + PartialEq + Default + Clone + Send + Sync + 'static
{
}

impl<T> ElectionValue for T where
    T: Serialize + DeserializeOwned + PartialEq + Default + Clone + Send + Sync + 'static
{
}

/// Result of one [`LeaderElectionCell::update`] round.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderUpdate<T> {
    /// The payload of the current leader.
    pub value: T,
    pub is_leader: bool,
    /// Call `update` again no later than this.
    pub next_update: Duration,
}

/// What the last observation of the record asks for.
enum Decision<T> {
    Claim(Fence),
    Foreign { value: T, next_update: Duration },
}

/// The single precondition guarding a claim.
enum Fence {
    /// Nothing is stored at the key.
    Empty,
    /// The record's ttl still equals the one last seen by this cell.
    Ttl,
    /// The record is exactly the one observed. Used for records lacking a ttl.
    Unchanged(Value),
}

struct Observed<T> {
    record: LeaderRecord<T>,
    raw: Value,
}

/// One process's handle on one election.
///
/// The cell keeps the last ttl it saw or wrote and whether it believes it is
/// leading. Every operation takes `&mut self`; to share an election between
/// tasks, hand the cell to an [`Elector`](crate::Elector).
pub struct LeaderElectionCell<T> {
    key: AgencyKey,
    config: ElectionConfig,
    clock: Arc<dyn Clock>,
    last_ttl: i64,
    leading: bool,
    // set when a resignation failed with an error worth retrying
    resign_pending: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for LeaderElectionCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElectionCell")
            .field("key", &self.key)
            .field("lease", &self.config.lease)
            .field("last_ttl", &self.last_ttl)
            .field("leading", &self.leading)
            .finish_non_exhaustive()
    }
}

impl<T: ElectionValue> LeaderElectionCell<T> {
    /// Create a cell on the system clock with default timeouts. The lease is
    /// validated like any other config.
    pub fn new(key: AgencyKey, lease: Duration) -> Result<Self> {
        Self::with_config(key, ElectionConfig::with_lease(lease), Arc::new(SystemClock))
    }

    /// Create a cell with explicit tuning and clock. The config is validated.
    pub fn with_config(
        key: AgencyKey,
        config: ElectionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(key, config, clock))
    }

    fn build(key: AgencyKey, config: ElectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            key,
            config,
            clock,
            last_ttl: 0,
            leading: false,
            resign_pending: false,
            _value: PhantomData,
        }
    }

    pub fn key(&self) -> &AgencyKey {
        &self.key
    }

    pub fn lease(&self) -> Duration {
        self.config.lease
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Whether this cell's own claim was the active one at its last observation.
    pub fn is_leading(&self) -> bool {
        self.leading
    }

    /// The ttl last observed or written, 0 if none.
    pub fn last_ttl(&self) -> i64 {
        self.last_ttl
    }

    /// Condition holding only while the record's payload equals `expected`.
    ///
    /// Meant for the caller's own transactions, right after an update reported
    /// leadership: it checks identity, not whether the lease is still valid.
    pub fn leader_condition(&self, expected: &T) -> Result<ConditionsMap> {
        let mut conditions = ConditionsMap::new();
        conditions.insert(
            self.key.child(KEY_DATA),
            Condition::IfEqual(serde_json::to_value(expected)?),
        );
        Ok(conditions)
    }

    /// Read the current leader's payload, or the default value if there is none.
    pub async fn read<A>(&self, cancel: &CancellationToken, agency: &A) -> Result<T>
    where
        A: Agency + ?Sized,
    {
        Ok(self
            .read_cell(cancel, agency)
            .await?
            .and_then(|observed| observed.record.data)
            .unwrap_or_default())
    }

    /// Check the election and claim or renew it for `value` when possible.
    ///
    /// Lost races are retried after `min_update_delay` until the race is
    /// decided, the token is cancelled or another error occurs.
    pub async fn update<A>(
        &mut self,
        cancel: &CancellationToken,
        agency: &A,
        value: T,
    ) -> Result<LeaderUpdate<T>>
    where
        A: Agency + ?Sized,
    {
        loop {
            let observed = self.read_cell(cancel, agency).await?;
            self.resign_pending = false;

            let fence = match self.decide(observed, self.clock.now_ms(), &value) {
                Decision::Claim(fence) => fence,
                Decision::Foreign { value, next_update } => {
                    return Ok(LeaderUpdate {
                        value,
                        is_leader: false,
                        next_update,
                    })
                }
            };

            match self.try_become_leader(cancel, agency, &value, fence).await {
                Ok(()) => {
                    return Ok(LeaderUpdate {
                        value,
                        is_leader: true,
                        next_update: (self.config.lease / 2).max(self.config.min_update_delay),
                    })
                }
                Err(e) if e.is_precondition_failed() => {
                    counter!(LEADER_ELECTION_LOST_RACES_TOTAL.name).increment(1);
                    if cancel.is_cancelled() {
                        return Err(e);
                    }
                    debug!(key = %self.key, "lost the race for the leader record, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
                        _ = tokio::time::sleep(self.config.min_update_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Give up leadership by deleting the record, if this cell still owns it.
    ///
    /// Finding the record already replaced counts as success. On any other
    /// error the caller should call `resign` again.
    pub async fn resign<A>(&mut self, cancel: &CancellationToken, agency: &A) -> Result<()>
    where
        A: Agency + ?Sized,
    {
        if !self.leading && !self.resign_pending {
            return Ok(());
        }
        self.leading = false;
        self.resign_pending = true;

        let mut trx = Transaction::new();
        trx.add_condition(self.key.child(KEY_TTL), Condition::IfEqual(self.last_ttl.into()))
            .add_key(self.key.clone(), KeyOp::Delete);

        match bounded(cancel, self.config.call_timeout, agency.write_transaction(trx)).await {
            Ok(()) => {
                self.resign_pending = false;
                info!(key = %self.key, "resigned leadership");
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => {
                self.resign_pending = false;
                debug!(key = %self.key, "leader record already replaced, nothing to resign");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn read_cell<A>(
        &self,
        cancel: &CancellationToken,
        agency: &A,
    ) -> Result<Option<Observed<T>>>
    where
        A: Agency + ?Sized,
    {
        match bounded(cancel, self.config.call_timeout, agency.read_key(&self.key)).await {
            Ok(raw) => {
                let record = serde_json::from_value(raw.clone())?;
                Ok(Some(Observed { record, raw }))
            }
            Err(ElectionError::Agency(e)) if e.is_key_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn decide(
        &mut self,
        observed: Option<Observed<T>>,
        now_ms: u64,
        candidate: &T,
    ) -> Decision<T> {
        let Some(Observed { record, raw }) = observed else {
            return Decision::Claim(Fence::Empty);
        };
        let now_secs = unix_secs(now_ms);

        if record.is_expired(now_secs) {
            self.last_ttl = record.ttl;
            self.leading = false;
            if record.ttl == 0 {
                return Decision::Claim(Fence::Unchanged(raw));
            }
            return Decision::Claim(Fence::Ttl);
        }

        if record.ttl > now_secs && !self.leading && self.last_ttl == 0 {
            // First look at a live record: it is ours if it carries our payload.
            self.last_ttl = record.ttl;
            self.leading = record.data.clone().unwrap_or_default() == *candidate;
            if self.leading {
                info!(key = %self.key, ttl = record.ttl, "found own live leader record, resuming leadership");
            }
        }

        if record.ttl == self.last_ttl && self.leading {
            return Decision::Claim(Fence::Ttl);
        }

        if self.leading {
            info!(key = %self.key, ttl = record.ttl, "leadership taken over by another candidate");
        }
        self.last_ttl = record.ttl;
        self.leading = false;

        let remaining_ms = record
            .ttl
            .saturating_mul(1000)
            .saturating_sub(i64::try_from(now_ms).unwrap_or(i64::MAX));
        let next_update = u64::try_from(remaining_ms)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
            .max(self.config.min_update_delay);

        Decision::Foreign {
            value: record.data.unwrap_or_default(),
            next_update,
        }
    }

    async fn try_become_leader<A>(
        &mut self,
        cancel: &CancellationToken,
        agency: &A,
        value: &T,
        fence: Fence,
    ) -> Result<()>
    where
        A: Agency + ?Sized,
    {
        let lease_ms = u64::try_from(self.config.lease.as_millis()).unwrap_or(u64::MAX);
        let new_ttl = unix_secs(self.clock.now_ms().saturating_add(lease_ms));
        let record = LeaderRecord::new(value.clone(), new_ttl);

        let mut trx = Transaction::new();
        trx.add_key(self.key.clone(), KeyOp::Set(serde_json::to_value(&record)?));
        match fence {
            Fence::Empty => trx.add_condition(self.key.clone(), Condition::OldEmpty(true)),
            Fence::Ttl => trx.add_condition(
                self.key.child(KEY_TTL),
                Condition::IfEqual(self.last_ttl.into()),
            ),
            Fence::Unchanged(raw) => trx.add_condition(self.key.clone(), Condition::IfEqual(raw)),
        };

        bounded(cancel, self.config.call_timeout, agency.write_transaction(trx)).await?;

        counter!(LEADER_ELECTION_CLAIMS_TOTAL.name).increment(1);
        if self.leading {
            debug!(key = %self.key, ttl = new_ttl, "renewed leader lease");
        } else {
            info!(key = %self.key, ttl = new_ttl, "became leader");
        }
        self.last_ttl = new_ttl;
        self.leading = true;
        Ok(())
    }
}

/// Run one agency call under the per call timeout, giving up early on cancellation.
async fn bounded<F, R>(cancel: &CancellationToken, timeout: Duration, call: F) -> Result<R>
where
    F: Future<Output = agency_core::agency::Result<R>>,
{
    if cancel.is_cancelled() {
        return Err(ElectionError::Cancelled);
    }
    tokio::select! {
        biased;
        res = tokio::time::timeout(timeout, call) => match res {
            Ok(res) => res.map_err(ElectionError::from),
            Err(_) => Err(ElectionError::Timeout(timeout)),
        },
        _ = cancel.cancelled() => Err(ElectionError::Cancelled),
    }
}

fn unix_secs(ms: u64) -> i64 {
    i64::try_from(ms / 1000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use agency_store::MemoryAgency;
    use serde_json::json;

    const NOW_MS: u64 = 1_000_000;

    fn cell(clock: &Arc<ManualClock>) -> LeaderElectionCell<String> {
        LeaderElectionCell::with_config(
            AgencyKey::new(["a", "leader"]),
            ElectionConfig::with_lease(Duration::from_secs(2)),
            clock.clone(),
        )
        .unwrap()
    }

    fn observed(data: &str, ttl: i64) -> Option<Observed<String>> {
        let record = LeaderRecord::new(data.to_string(), ttl);
        let raw = serde_json::to_value(&record).unwrap();
        Some(Observed { record, raw })
    }

    #[test]
    fn absent_record_is_claimed_with_empty_fence() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let decision = cell.decide(None, NOW_MS, &"A".to_string());
        assert!(matches!(decision, Decision::Claim(Fence::Empty)));
    }

    #[test]
    fn expired_record_is_claimed_with_its_stale_ttl() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let decision = cell.decide(observed("B", 999), NOW_MS, &"A".to_string());
        assert!(matches!(decision, Decision::Claim(Fence::Ttl)));
        assert_eq!(cell.last_ttl(), 999);
        assert!(!cell.is_leading());
    }

    #[test]
    fn own_record_is_adopted_on_first_observation() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let decision = cell.decide(observed("A", 1005), NOW_MS, &"A".to_string());
        assert!(matches!(decision, Decision::Claim(Fence::Ttl)));
        assert!(cell.is_leading());
        assert_eq!(cell.last_ttl(), 1005);
    }

    #[test]
    fn foreign_record_reports_remaining_lease() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        match cell.decide(observed("B", 1002), NOW_MS, &"A".to_string()) {
            Decision::Foreign { value, next_update } => {
                assert_eq!(value, "B");
                assert_eq!(next_update, Duration::from_secs(2));
            }
            Decision::Claim(_) => panic!("foreign record must not be claimed"),
        }
        assert_eq!(cell.last_ttl(), 1002);
        assert!(!cell.is_leading());
    }

    #[test]
    fn foreign_delay_is_floored() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        // ttl equals the current second: not expired, already in the past in ms
        match cell.decide(observed("B", 1000), NOW_MS + 700, &"A".to_string()) {
            Decision::Foreign { next_update, .. } => {
                assert_eq!(next_update, Duration::from_millis(500))
            }
            Decision::Claim(_) => panic!("foreign record must not be claimed"),
        }
    }

    #[test]
    fn record_without_ttl_is_fenced_on_its_content() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let raw = json!({"data": "B"});
        let record = serde_json::from_value(raw.clone()).unwrap();
        match cell.decide(Some(Observed { record, raw }), NOW_MS, &"A".to_string()) {
            Decision::Claim(Fence::Unchanged(fenced)) => assert_eq!(fenced, json!({"data": "B"})),
            _ => panic!("record without ttl must be claimable"),
        }
    }

    #[test]
    fn leader_condition_targets_data_field() -> Result<()> {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let cell = cell(&clock);
        let conditions = cell.leader_condition(&"A".to_string())?;
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[&AgencyKey::new(["a", "leader", "data"])],
            Condition::IfEqual(json!("A"))
        );
        Ok(())
    }

    #[test]
    fn plain_constructor_validates_the_lease() {
        let key = AgencyKey::new(["a", "leader"]);
        for lease in [Duration::ZERO, Duration::from_millis(900)] {
            let err = LeaderElectionCell::<String>::new(key.clone(), lease).unwrap_err();
            assert!(matches!(err, ElectionError::InvalidConfig(_)));
        }
        assert!(LeaderElectionCell::<String>::new(key, Duration::from_secs(2)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn leader_delay_is_floored_at_min_update_delay() -> Result<()> {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let config = ElectionConfig {
            lease: Duration::ZERO,
            ..ElectionConfig::default()
        };
        let mut cell = LeaderElectionCell::build(AgencyKey::new(["a", "leader"]), config, clock);
        let agency = MemoryAgency::new();
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let update = cell.update(&cancel, &agency, "A".to_string()).await?;
            assert!(update.is_leader);
            assert_eq!(update.next_update, Duration::from_millis(500));
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn resign_without_leadership_is_a_noop() -> Result<()> {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let agency = MemoryAgency::new();
        cell.resign(&CancellationToken::new(), &agency).await?;
        assert_eq!(agency.commit_index().await, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_short_circuits_before_any_call() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let mut cell = cell(&clock);
        let agency = MemoryAgency::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cell
            .update(&cancel, &agency, "A".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::Cancelled));
        assert_eq!(agency.commit_index().await, 0);
    }
}
