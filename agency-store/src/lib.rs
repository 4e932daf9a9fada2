mod connection;
pub use connection::{ConnResponse, Connection, ConnectionConfig, ReqwestConnection};

mod providers;
pub use providers::{
    http::{HttpAgency, DEFAULT_ROOT},
    in_memory::MemoryAgency,
};

use agency_core::agency::{Agency, AgencyKey, Result, Transaction};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum AgencyStorage {
    Http(HttpAgency),
    InMemory(MemoryAgency), // InMemory is used for tests and local runs
}

#[async_trait]
impl Agency for AgencyStorage {
    async fn read_key(&self, key: &AgencyKey) -> Result<Value> {
        match self {
            AgencyStorage::Http(store) => store.read_key(key).await,
            AgencyStorage::InMemory(store) => store.read_key(key).await,
        }
    }

    async fn write_transaction(&self, trx: Transaction) -> Result<()> {
        match self {
            AgencyStorage::Http(store) => store.write_transaction(trx).await,
            AgencyStorage::InMemory(store) => store.write_transaction(trx).await,
        }
    }
}
