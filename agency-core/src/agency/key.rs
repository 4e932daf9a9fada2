use serde::{Deserialize, Serialize};
use std::fmt;

/// A hierarchical agency path, stored as its individual segments.
///
/// `["a", "leader"]` addresses the object at `/a/leader`; an empty key
/// addresses the root of the tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AgencyKey(Vec<String>);

impl AgencyKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AgencyKey(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a slash separated path. Empty segments are dropped, so `"/a//b/"`
    /// and `"a/b"` name the same key.
    pub fn parse(path: &str) -> Self {
        AgencyKey::new(path.split('/').filter(|s| !s.is_empty()))
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        AgencyKey(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &AgencyKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for AgencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl From<&[&str]> for AgencyKey {
    fn from(segments: &[&str]) -> Self {
        AgencyKey::new(segments.iter().copied())
    }
}

impl From<Vec<String>> for AgencyKey {
    fn from(segments: Vec<String>) -> Self {
        AgencyKey(segments)
    }
}
