//! Node identifiers and per-run name prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{VnfError, VnfResult};

/// A validated host or switch identifier.
///
/// Node ids must:
/// - Be 1-10 characters long
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Start with an alphanumeric character
///
/// The length bound keeps `<prefix><node>` within the 15-byte Linux
/// interface name limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Maximum length of a node id.
    pub const MAX_LENGTH: usize = 10;

    /// Create a new node id, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the id format is invalid.
    pub fn new(id: impl Into<String>) -> VnfResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the node id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> VnfResult<()> {
        let invalid = || VnfError::InvalidNodeId { id: id.to_string() };

        if id.is_empty() || id.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        let mut chars = id.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = VnfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = VnfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = VnfError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Short prefix applied to every kernel and docker object created by a run.
///
/// Five characters: `v` followed by four hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunPrefix(String);

impl RunPrefix {
    /// Generate a random prefix derived from a UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        Self(format!("v{}", hex::encode(&uuid.as_bytes()[..2])))
    }

    /// Use a fixed prefix (tests and reproducible runs).
    #[must_use]
    pub fn fixed(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// Get the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of an object owned by this run.
    #[must_use]
    pub fn scoped(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }
}

impl fmt::Display for RunPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_node_ids() {
        assert!(NodeId::new("server").is_ok());
        assert!(NodeId::new("s1").is_ok());
        assert!(NodeId::new("edge-sw_2").is_ok());
    }

    #[test]
    fn invalid_node_ids() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("-s1").is_err());
        assert!(NodeId::new("_s1").is_err());
        assert!(NodeId::new("s 1").is_err());
        assert!(NodeId::new("a".repeat(11)).is_err());
    }

    #[test]
    fn node_id_serde_validates() {
        let ok: NodeId = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(ok.as_str(), "client");
        assert!(serde_json::from_str::<NodeId>("\"!bad\"").is_err());
    }

    #[test]
    fn generated_prefixes_fit_interface_names() {
        let prefix = RunPrefix::generate();
        assert_eq!(prefix.as_str().len(), 5);
        assert!(prefix.as_str().starts_with('v'));
        assert!(prefix.scoped(&"x".repeat(NodeId::MAX_LENGTH)).len() <= 15);
    }

    #[test]
    fn fixed_prefix_scopes_names() {
        let prefix = RunPrefix::fixed("vtest");
        assert_eq!(prefix.scoped("s1"), "vtests1");
    }
}
