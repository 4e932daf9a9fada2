use agency_core::agency::{Agency, AgencyError, AgencyKey, KeyOp, Result, Transaction};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// MemoryAgency is a single-process agency holding one JSON tree.
///
/// Every read and every transaction runs under the same lock, which makes the
/// store linearizable. SHOULD BE USED ONLY FOR TESTING AND LOCAL RUNS.
#[derive(Debug, Clone, Default)]
pub struct MemoryAgency {
    inner: Arc<RwLock<AgencyTree>>,
}

#[derive(Debug)]
struct AgencyTree {
    root: Value,
    commit_index: u64,
}

impl Default for AgencyTree {
    fn default() -> Self {
        AgencyTree {
            root: Value::Object(Map::new()),
            commit_index: 0,
        }
    }
}

impl MemoryAgency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions committed so far.
    pub async fn commit_index(&self) -> u64 {
        self.inner.read().await.commit_index
    }

    /// A copy of the whole tree, for inspection in tests.
    pub async fn snapshot(&self) -> Value {
        self.inner.read().await.root.clone()
    }
}

#[async_trait]
impl Agency for MemoryAgency {
    async fn read_key(&self, key: &AgencyKey) -> Result<Value> {
        let tree = self.inner.read().await;
        lookup(&tree.root, key)
            .cloned()
            .ok_or_else(|| AgencyError::KeyNotFound(key.to_string()))
    }

    async fn write_transaction(&self, trx: Transaction) -> Result<()> {
        let mut tree = self.inner.write().await;

        for (key, condition) in trx.conditions() {
            if !condition.holds(lookup(&tree.root, key)) {
                trace!(key = %key, ?condition, "agency precondition does not hold");
                return Err(AgencyError::PreconditionFailed(key.to_string()));
            }
        }

        for (key, op) in trx.ops() {
            match op {
                KeyOp::Set(value) => set(&mut tree.root, key.segments(), value.clone()),
                KeyOp::Delete => remove(&mut tree.root, key),
            }
        }
        tree.commit_index += 1;

        Ok(())
    }
}

fn lookup<'a>(root: &'a Value, key: &AgencyKey) -> Option<&'a Value> {
    key.segments()
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

// Writing below a scalar replaces the scalar with an object, as the agency does.
fn set(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set(child, rest, value);
    }
}

fn remove(root: &mut Value, key: &AgencyKey) {
    let Some((leaf, parents)) = key.segments().split_last() else {
        *root = Value::Object(Map::new());
        return;
    };

    let mut node = root;
    for segment in parents {
        match node.as_object_mut().and_then(|map| map.get_mut(segment)) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Some(map) = node.as_object_mut() {
        map.remove(leaf);
    }
}
