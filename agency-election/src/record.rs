use serde::{Deserialize, Serialize};

pub(crate) const KEY_DATA: &str = "data";
pub(crate) const KEY_TTL: &str = "ttl";

/// The value stored at an election key: the leader's payload and the unix
/// second after which the claim is up for grabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderRecord<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ttl: i64,
}

fn is_zero(ttl: &i64) -> bool {
    *ttl == 0
}

impl<T> LeaderRecord<T> {
    pub fn new(data: T, ttl: i64) -> Self {
        Self {
            data: Some(data),
            ttl,
        }
    }

    /// A record is expired once its ttl lies strictly before `now_secs`.
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.ttl < now_secs
    }
}
