//! Edge types for the river network.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::ids::{LegacyId, NodeId, PartitionKey};

/// A directed flow relationship in the national network.
///
/// Water moves from `id` toward `toid`. Several edges may share a `toid`
/// (confluence) and `toid` is `None` at a basin outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    /// Canonical id of the feature.
    pub id: NodeId,
    /// Canonical id of the downstream node.
    pub toid: Option<NodeId>,
    /// Legacy numeric id.
    pub hf_id: Option<LegacyId>,
    /// Hydrologic-location reference.
    pub hl_uri: Option<String>,
    /// Legacy ordering key.
    pub hf_hydroseq: Option<f64>,
    /// Ordering key.
    pub hydroseq: Option<f64>,
    /// Partition this edge belongs to.
    pub vpu: Option<PartitionKey>,
    /// Legacy ids folded into this feature (from `member_COMID`).
    #[serde(skip)]
    pub members: Vec<LegacyId>,
}

impl NetworkEdge {
    /// Create an edge with only the topology fields set.
    pub fn new(id: impl Into<NodeId>, toid: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            toid,
            hf_id: None,
            hl_uri: None,
            hf_hydroseq: None,
            hydroseq: None,
            vpu: None,
            members: Vec::new(),
        }
    }

    /// Set the legacy id.
    pub fn with_hf_id(mut self, hf_id: i64) -> Self {
        self.hf_id = Some(LegacyId::new(hf_id));
        self
    }

    /// Set the hydrologic-location reference.
    pub fn with_hl_uri(mut self, uri: impl Into<String>) -> Self {
        self.hl_uri = Some(uri.into());
        self
    }

    /// Set the legacy ordering key.
    pub fn with_hf_hydroseq(mut self, key: f64) -> Self {
        self.hf_hydroseq = Some(key);
        self
    }

    /// Set the partition key.
    pub fn with_vpu(mut self, vpu: impl Into<String>) -> Self {
        self.vpu = Some(PartitionKey::new(vpu));
        self
    }

    /// True if `node` is this edge's source or target.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.id == node || self.toid.as_ref() == Some(node)
    }

    /// True if `legacy` is this edge's legacy id or one of its members.
    pub fn carries_legacy(&self, legacy: LegacyId) -> bool {
        self.hf_id == Some(legacy) || self.members.contains(&legacy)
    }

    /// Project onto the `{id, toid}` pair used by traversal.
    pub fn flow(&self) -> FlowEdge {
        FlowEdge::new(self.id.clone(), self.toid.clone())
    }

    /// Rank two candidate edges: higher `hf_hydroseq` wins, missing keys rank
    /// lowest, and ties go to the smaller id.
    pub fn rank(&self, other: &Self) -> Ordering {
        let a = self.hf_hydroseq.unwrap_or(f64::NEG_INFINITY);
        let b = other.hf_hydroseq.unwrap_or(f64::NEG_INFINITY);
        a.total_cmp(&b).then_with(|| other.id.cmp(&self.id))
    }
}

/// The `{id, toid}` projection of a network edge.
///
/// Implements `Ord` for deterministic ordering: (id, toid).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Upstream node.
    pub id: NodeId,
    /// Downstream node, `None` at a terminal outlet.
    pub toid: Option<NodeId>,
}

impl FlowEdge {
    /// Create a new flow edge.
    pub fn new(id: impl Into<NodeId>, toid: Option<NodeId>) -> Self {
        Self { id: id.into(), toid }
    }

    /// Create a flow edge between two named nodes.
    pub fn between(id: impl Into<NodeId>, toid: impl Into<NodeId>) -> Self {
        Self::new(id, Some(toid.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_prefers_higher_hydroseq() {
        let low = NetworkEdge::new("wb-1", None).with_hf_hydroseq(5.0);
        let high = NetworkEdge::new("wb-2", None).with_hf_hydroseq(9.0);
        assert_eq!(high.rank(&low), Ordering::Greater);
    }

    #[test]
    fn test_rank_missing_key_ranks_lowest() {
        let missing = NetworkEdge::new("wb-1", None);
        let keyed = NetworkEdge::new("wb-2", None).with_hf_hydroseq(-100.0);
        assert_eq!(missing.rank(&keyed), Ordering::Less);
    }

    #[test]
    fn test_rank_tie_goes_to_smaller_id() {
        let a = NetworkEdge::new("wb-1", None).with_hf_hydroseq(3.0);
        let b = NetworkEdge::new("wb-2", None).with_hf_hydroseq(3.0);
        assert_eq!(a.rank(&b), Ordering::Greater);
    }

    #[test]
    fn test_carries_legacy_member() {
        let mut edge = NetworkEdge::new("wb-1", None).with_hf_id(10);
        edge.members = vec![LegacyId::new(11), LegacyId::new(12)];
        assert!(edge.carries_legacy(LegacyId::new(10)));
        assert!(edge.carries_legacy(LegacyId::new(12)));
        assert!(!edge.carries_legacy(LegacyId::new(13)));
    }

    #[test]
    fn test_flow_edge_ordering() {
        let e1 = FlowEdge::between("a", "b");
        let e2 = FlowEdge::between("a", "c");
        let e3 = FlowEdge::new("b", None);
        assert!(e1 < e2);
        assert!(e2 < e3);
    }
}
