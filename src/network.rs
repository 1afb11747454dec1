//! In-memory network graphs.
//!
//! Two shapes of the same data:
//!
//! - [`NetworkIndex`]: the national edge set with legacy ids, hydrologic
//!   locations, ordering keys and partition keys. Used for origin resolution
//!   and partition selection.
//! - [`Subnetwork`]: the `{id, toid}` projection of one partition. The direct
//!   input to upstream traversal.
//!
//! Both are built once per operation and are read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{SchemaError, SchemaNormalizer};
use crate::types::{FlowEdge, LegacyId, NetworkEdge, NodeId, PartitionKey, Table};

/// National network index.
///
/// Uses BTreeMap lookups so every query returns edges in a stable order.
#[derive(Debug, Clone, Default)]
pub struct NetworkIndex {
    edges: Vec<NetworkEdge>,
    /// Node -> edges where it is the source or the target.
    touching: BTreeMap<NodeId, Vec<usize>>,
    /// Legacy id -> edges carrying it (as `hf_id` or member).
    by_legacy: BTreeMap<LegacyId, Vec<usize>>,
    /// Hydrologic-location URI -> edges.
    by_uri: BTreeMap<String, Vec<usize>>,
}

impl NetworkIndex {
    /// Build an index from canonical edges.
    pub fn new(edges: Vec<NetworkEdge>) -> Self {
        let mut touching: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        let mut by_legacy: BTreeMap<LegacyId, Vec<usize>> = BTreeMap::new();
        let mut by_uri: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (i, edge) in edges.iter().enumerate() {
            touching.entry(edge.id.clone()).or_default().push(i);
            if let Some(toid) = &edge.toid {
                if toid != &edge.id {
                    touching.entry(toid.clone()).or_default().push(i);
                }
            }

            let mut legacy: BTreeSet<LegacyId> = edge.members.iter().copied().collect();
            legacy.extend(edge.hf_id);
            for id in legacy {
                by_legacy.entry(id).or_default().push(i);
            }

            if let Some(uri) = &edge.hl_uri {
                by_uri.entry(uri.clone()).or_default().push(i);
            }
        }

        Self { edges, touching, by_legacy, by_uri }
    }

    /// Build an index from a network table with any supported column aliases.
    pub fn from_table(table: &Table) -> Result<Self, SchemaError> {
        Ok(Self::new(SchemaNormalizer::new().normalize_edges(table)?))
    }

    fn collect(&self, idx: Option<&Vec<usize>>) -> Vec<&NetworkEdge> {
        idx.map(|v| v.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Edges where `id == node` or `toid == node`.
    pub fn touching(&self, node: &NodeId) -> Vec<&NetworkEdge> {
        self.collect(self.touching.get(node))
    }

    /// Edges whose legacy id (or a member id) equals `legacy`.
    pub fn with_legacy(&self, legacy: LegacyId) -> Vec<&NetworkEdge> {
        self.collect(self.by_legacy.get(&legacy))
    }

    /// Edges whose hydrologic-location reference equals `uri` exactly.
    pub fn with_hl_uri(&self, uri: &str) -> Vec<&NetworkEdge> {
        self.collect(self.by_uri.get(uri))
    }

    /// True if `node` is the `toid` of an edge carrying a hydrologic-location
    /// reference, i.e. it is what such a reference resolves to.
    pub fn is_location_outlet(&self, node: &NodeId) -> bool {
        self.touching(node)
            .into_iter()
            .any(|e| e.hl_uri.is_some() && e.toid.as_ref() == Some(node))
    }

    /// Deduplicated partition keys of the edges touching `node`.
    pub fn partitions_of(&self, node: &NodeId) -> BTreeSet<PartitionKey> {
        self.touching(node)
            .into_iter()
            .filter_map(|e| e.vpu.clone())
            .collect()
    }

    /// All edges.
    pub fn edges(&self) -> &[NetworkEdge] {
        &self.edges
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True if the index has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Highest-ranked edge among `candidates` (see [`NetworkEdge::rank`]).
pub fn best_match<'a, I>(candidates: I) -> Option<&'a NetworkEdge>
where
    I: IntoIterator<Item = &'a NetworkEdge>,
{
    candidates.into_iter().max_by(|a, b| a.rank(b))
}

/// The `{id, toid}` edge set of one partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subnetwork {
    edges: Vec<FlowEdge>,
}

impl Subnetwork {
    /// Create a subnetwork from flow edges.
    pub fn new(edges: Vec<FlowEdge>) -> Self {
        Self { edges }
    }

    /// Build a subnetwork from a network table with any supported aliases.
    pub fn from_table(table: &Table) -> Result<Self, SchemaError> {
        SchemaNormalizer::new().subnetwork(table)
    }

    /// All edges, as loaded (may contain duplicates).
    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    /// True if any edge has `node` as its source or target.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| &e.id == node || e.toid.as_ref() == Some(node))
    }

    /// Deduplicated edges in canonical order.
    pub fn unique_edges(&self) -> BTreeSet<&FlowEdge> {
        self.edges.iter().collect()
    }

    /// Map each node to its direct upstream contributors.
    ///
    /// Edges are deduplicated first; terminal edges (`toid == None`) and
    /// self-loops contribute nothing.
    pub fn upstream_map(&self) -> BTreeMap<&NodeId, BTreeSet<&NodeId>> {
        let mut upstream: BTreeMap<&NodeId, BTreeSet<&NodeId>> = BTreeMap::new();
        for edge in self.unique_edges() {
            if let Some(toid) = &edge.toid {
                if toid != &edge.id {
                    upstream.entry(toid).or_default().insert(&edge.id);
                }
            }
        }
        upstream
    }

    /// Number of edges, as loaded.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True if there are no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl From<&NetworkIndex> for Subnetwork {
    fn from(index: &NetworkIndex) -> Self {
        Self::new(index.edges().iter().map(NetworkEdge::flow).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> NetworkIndex {
        NetworkIndex::new(vec![
            NetworkEdge::new("wb-1", Some("nex-2".into())).with_hf_id(101).with_vpu("01"),
            NetworkEdge::new("wb-3", Some("nex-2".into())).with_hf_id(103).with_vpu("01"),
            NetworkEdge::new("nex-2", Some("wb-4".into())).with_vpu("02"),
            NetworkEdge::new("wb-4", None).with_hf_id(104).with_hl_uri("Gages-1").with_vpu("02"),
        ])
    }

    #[test]
    fn test_touching() {
        let index = sample_index();
        let ids: Vec<_> = index.touching(&"nex-2".into()).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["wb-1", "wb-3", "nex-2"]);
    }

    #[test]
    fn test_partitions_of_deduplicates() {
        let index = sample_index();
        let keys = index.partitions_of(&"nex-2".into());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&PartitionKey::from("01")));
        assert!(keys.contains(&PartitionKey::from("02")));
        assert_eq!(index.partitions_of(&"wb-1".into()).len(), 1);
    }

    #[test]
    fn test_lookup_by_legacy_and_uri() {
        let index = sample_index();
        assert_eq!(index.with_legacy(LegacyId::new(103))[0].id.as_str(), "wb-3");
        assert_eq!(index.with_hl_uri("Gages-1")[0].id.as_str(), "wb-4");
        assert!(index.with_hl_uri("Gages-2").is_empty());
    }

    #[test]
    fn test_location_outlet() {
        let mut edges = sample_index().edges().to_vec();
        edges.push(NetworkEdge::new("wb-5", Some("nex-6".into())).with_hl_uri("Gages-5"));
        let index = NetworkIndex::new(edges);

        assert!(index.is_location_outlet(&"nex-6".into()));
        // The upstream edge itself is not an outlet, nor is an untagged target.
        assert!(!index.is_location_outlet(&"wb-5".into()));
        assert!(!index.is_location_outlet(&"nex-2".into()));
        // A tagged edge with no target has no outlet.
        assert!(!index.is_location_outlet(&"wb-4".into()));
    }

    #[test]
    fn test_upstream_map_dedups() {
        let sub = Subnetwork::new(vec![
            FlowEdge::between("a", "c"),
            FlowEdge::between("a", "c"),
            FlowEdge::between("b", "c"),
            FlowEdge::new("c", None),
        ]);
        let map = sub.upstream_map();
        let c = NodeId::from("c");
        assert_eq!(map[&c].len(), 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_best_match_highest_key() {
        let a = NetworkEdge::new("wb-1", None).with_hf_hydroseq(5.0);
        let b = NetworkEdge::new("wb-2", None).with_hf_hydroseq(9.0);
        assert_eq!(best_match([&a, &b]).unwrap().id.as_str(), "wb-2");
        assert!(best_match(std::iter::empty()).is_none());
    }
}
