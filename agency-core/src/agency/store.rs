use async_trait::async_trait;
use serde_json::Value;

use super::errors::Result;
use super::key::AgencyKey;
use super::transaction::Transaction;

/// The client side contract of a linearizable, hierarchical agency store.
///
/// Deadlines and cancellation are the caller's business: dropping the
/// returned future abandons the request.
#[async_trait]
pub trait Agency: Send + Sync + 'static {
    /// Read the value stored at `key`.
    ///
    /// Fails with [`AgencyError::KeyNotFound`](super::AgencyError::KeyNotFound)
    /// when nothing is stored there.
    async fn read_key(&self, key: &AgencyKey) -> Result<Value>;

    /// Commit every operation of `trx` atomically, provided all of its
    /// conditions hold.
    ///
    /// Fails with [`AgencyError::PreconditionFailed`](super::AgencyError::PreconditionFailed)
    /// and leaves the store untouched when any condition does not hold.
    async fn write_transaction(&self, trx: Transaction) -> Result<()>;
}
