use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::key::AgencyKey;

/// Conditions guarding a transaction, keyed by the path they inspect.
pub type ConditionsMap = BTreeMap<AgencyKey, Condition>;

/// A write applied to one key when the transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOp {
    /// Replace whatever is stored at the key, creating parents as needed.
    Set(Value),
    /// Remove the key and everything below it.
    Delete,
}

impl KeyOp {
    /// Encoding used by the agency write API.
    pub fn to_wire(&self) -> Value {
        match self {
            KeyOp::Set(value) => json!({ "op": "set", "new": value }),
            KeyOp::Delete => json!({ "op": "delete" }),
        }
    }
}

/// A precondition evaluated against the current store content at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The value at the key equals the given value.
    IfEqual(Value),
    /// `OldEmpty(true)`: nothing is stored at the key.
    /// `OldEmpty(false)`: something is stored at the key.
    OldEmpty(bool),
}

impl Condition {
    /// Evaluate the condition against the value currently stored at its key.
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match self {
            Condition::IfEqual(expected) => current == Some(expected),
            Condition::OldEmpty(empty) => current.is_none() == *empty,
        }
    }

    /// Encoding used by the agency write API.
    pub fn to_wire(&self) -> Value {
        match self {
            Condition::IfEqual(expected) => json!({ "old": expected }),
            Condition::OldEmpty(empty) => json!({ "oldEmpty": empty }),
        }
    }
}

/// A set of writes committed atomically if and only if every condition holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    client_id: Option<String>,
    ops: Vec<(AgencyKey, KeyOp)>,
    conditions: ConditionsMap,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag the transaction with a client id, echoed by the agency in its logs.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn add_key(&mut self, key: AgencyKey, op: KeyOp) -> &mut Self {
        self.ops.push((key, op));
        self
    }

    /// Add a condition. A later condition on the same key replaces the earlier one.
    pub fn add_condition(&mut self, key: AgencyKey, condition: Condition) -> &mut Self {
        self.conditions.insert(key, condition);
        self
    }

    pub fn add_conditions(&mut self, conditions: ConditionsMap) -> &mut Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn ops(&self) -> &[(AgencyKey, KeyOp)] {
        &self.ops
    }

    pub fn conditions(&self) -> &ConditionsMap {
        &self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_evaluate_against_current_value() {
        let eq = Condition::IfEqual(json!(42));
        assert!(eq.holds(Some(&json!(42))));
        assert!(!eq.holds(Some(&json!(41))));
        assert!(!eq.holds(None));

        assert!(Condition::OldEmpty(true).holds(None));
        assert!(!Condition::OldEmpty(true).holds(Some(&json!({}))));
        assert!(Condition::OldEmpty(false).holds(Some(&json!("x"))));
    }

    #[test]
    fn wire_encoding_matches_agency_api() {
        assert_eq!(
            KeyOp::Set(json!({"data": "A"})).to_wire(),
            json!({"op": "set", "new": {"data": "A"}})
        );
        assert_eq!(KeyOp::Delete.to_wire(), json!({"op": "delete"}));
        assert_eq!(Condition::IfEqual(json!(7)).to_wire(), json!({"old": 7}));
        assert_eq!(Condition::OldEmpty(true).to_wire(), json!({"oldEmpty": true}));
    }

    #[test]
    fn later_condition_on_same_key_wins() {
        let key = AgencyKey::new(["a", "leader"]);
        let mut trx = Transaction::new().with_client_id("cell-1");
        trx.add_condition(key.clone(), Condition::OldEmpty(true))
            .add_condition(key.clone(), Condition::IfEqual(json!(1)))
            .add_key(key.clone(), KeyOp::Delete);

        assert_eq!(trx.client_id(), Some("cell-1"));
        assert_eq!(trx.conditions().len(), 1);
        assert_eq!(trx.conditions()[&key], Condition::IfEqual(json!(1)));
        assert_eq!(trx.ops(), &[(key, KeyOp::Delete)]);
    }
}
