//! Identifier types for network nodes, legacy features, and partitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identifier of a node in the river network.
///
/// Opaque text (`wb-101`, `nex-7`, `tnx-1000000001`, or a bare numeric id).
/// Implements `Ord` so traversal output and id sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<LegacyId> for NodeId {
    fn from(id: LegacyId) -> Self {
        Self(id.0.to_string())
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Legacy per-feature identifier (COMID / `hf_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyId(i64);

impl LegacyId {
    /// Create a legacy id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer.
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Parse a legacy id from text.
    ///
    /// Accepts integers and decimal member notation (`"1234.1"` parses as
    /// `1234`). Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let whole = s.split('.').next().unwrap_or(s);
        whole.parse().ok().map(Self)
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LegacyId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Key of a regional data partition (vector processing unit, VPU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Create a partition key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
