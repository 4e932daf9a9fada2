use agency_core::agency::{Agency, AgencyError, AgencyKey, Result, Transaction};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::connection::{ConnResponse, Connection};

/// Prefix every agency path lives under.
pub const DEFAULT_ROOT: &str = "arango";

const READ_ENDPOINT: &str = "/_api/agency/read";
const WRITE_ENDPOINT: &str = "/_api/agency/write";

/// Agency client speaking the JSON read/write API over a [`Connection`].
#[derive(Clone)]
pub struct HttpAgency {
    conn: Arc<dyn Connection>,
    root: AgencyKey,
}

impl fmt::Debug for HttpAgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAgency")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl HttpAgency {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::with_root(conn, DEFAULT_ROOT)
    }

    /// Use `root` instead of [`DEFAULT_ROOT`] as the prefix of every path.
    /// An empty root addresses the tree directly.
    pub fn with_root(conn: Arc<dyn Connection>, root: &str) -> Self {
        Self {
            conn,
            root: AgencyKey::parse(root),
        }
    }

    fn full_key(&self, key: &AgencyKey) -> AgencyKey {
        key.segments()
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.child(segment.as_str()))
    }

    fn write_body(&self, trx: &Transaction) -> Value {
        let mut ops = Map::new();
        for (key, op) in trx.ops() {
            ops.insert(self.full_key(key).to_string(), op.to_wire());
        }

        let mut conditions = Map::new();
        for (key, condition) in trx.conditions() {
            conditions.insert(self.full_key(key).to_string(), condition.to_wire());
        }

        let mut envelope = vec![Value::Object(ops), Value::Object(conditions)];
        if let Some(client_id) = trx.client_id() {
            envelope.push(Value::String(client_id.to_string()));
        }
        json!([envelope])
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<ConnResponse> {
        let payload = serde_json::to_vec(body)?;
        self.conn.execute(Method::POST, endpoint, Some(payload)).await
    }
}

#[async_trait]
impl Agency for HttpAgency {
    async fn read_key(&self, key: &AgencyKey) -> Result<Value> {
        let full_key = self.full_key(key);
        let resp = self
            .post(READ_ENDPOINT, &json!([[full_key.to_string()]]))
            .await?;
        check_status(&resp)?;

        let mut results: Vec<Value> = serde_json::from_slice(&resp.body)?;
        if results.is_empty() {
            return Err(AgencyError::InvalidResponse(
                "read returned no result".to_string(),
            ));
        }
        let tree = results.swap_remove(0);

        full_key
            .segments()
            .iter()
            .try_fold(&tree, |node, segment| node.as_object()?.get(segment))
            .cloned()
            .ok_or_else(|| AgencyError::KeyNotFound(key.to_string()))
    }

    async fn write_transaction(&self, trx: Transaction) -> Result<()> {
        let resp = self.post(WRITE_ENDPOINT, &self.write_body(&trx)).await?;
        if resp.status == 412 {
            debug!(client_id = ?trx.client_id(), "agency transaction precondition failed");
            let keys: Vec<String> = trx.conditions().keys().map(|k| k.to_string()).collect();
            return Err(AgencyError::PreconditionFailed(keys.join(", ")));
        }
        check_status(&resp)
    }
}

fn check_status(resp: &ConnResponse) -> Result<()> {
    match resp.status {
        200..=299 => Ok(()),
        307 => Err(AgencyError::Redirected(
            resp.location.clone().unwrap_or_default(),
        )),
        status => Err(AgencyError::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(&resp.body).into_owned(),
        }),
    }
}
