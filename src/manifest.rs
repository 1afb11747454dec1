//! Subset manifests.
//!
//! A manifest describes one finished subset: where it started, which
//! partition it came from, how many features the traversal collected and how
//! many rows each layer kept. The `subset_id` is a content hash, so two runs
//! over the same partition data produce the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::traversal::TraversalResult;
use crate::types::{NodeId, OriginReference, PartitionKey};
use crate::SUBSET_SCHEMA_VERSION;

/// Row count of one extracted layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Layer name.
    pub name: String,
    /// Rows retained.
    pub rows: usize,
}

/// Manifest written alongside an extracted subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetManifest {
    /// Content hash of origin, partition and traversal ids.
    pub subset_id: String,
    /// Schema version.
    pub version: String,
    /// Origin reference as given by the caller.
    pub origin: OriginReference,
    /// Partition the subset was cut from.
    pub partition: PartitionKey,
    /// Outlet of the traversal.
    pub outlet: NodeId,
    /// Number of ids in the (trimmed) traversal result.
    pub feature_count: usize,
    /// Layers in caller order.
    pub layers: Vec<LayerSummary>,
    /// Creation time, UTC.
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SubsetIdInput<'a> {
    origin: &'a OriginReference,
    partition: &'a PartitionKey,
    ids: &'a [NodeId],
}

/// Builder for subset manifests.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    origin: OriginReference,
    partition: PartitionKey,
    outlet: NodeId,
    ids: Vec<NodeId>,
    layers: Vec<LayerSummary>,
}

impl ManifestBuilder {
    /// Start a manifest for a traversal cut from `partition`.
    pub fn new(origin: OriginReference, partition: PartitionKey, traversal: &TraversalResult) -> Self {
        Self {
            origin,
            partition,
            outlet: traversal.outlet().clone(),
            ids: traversal.ids().to_vec(),
            layers: Vec::new(),
        }
    }

    /// Record an extracted layer.
    pub fn layer(&mut self, name: impl Into<String>, rows: usize) -> &mut Self {
        self.layers.push(LayerSummary { name: name.into(), rows });
        self
    }

    /// Subset id for the recorded origin, partition and ids.
    pub fn subset_id(&self) -> String {
        canonical_hash_hex(&SubsetIdInput {
            origin: &self.origin,
            partition: &self.partition,
            ids: &self.ids,
        })
    }

    /// Build the manifest, stamped with the current time.
    pub fn build(self) -> SubsetManifest {
        SubsetManifest {
            subset_id: self.subset_id(),
            version: SUBSET_SCHEMA_VERSION.to_string(),
            feature_count: self.ids.len(),
            origin: self.origin,
            partition: self.partition,
            outlet: self.outlet,
            layers: self.layers,
            created_at: Utc::now(),
        }
    }
}

impl SubsetManifest {
    /// Rows retained for `layer`, if it was extracted.
    pub fn rows(&self, layer: &str) -> Option<usize> {
        self.layers.iter().find(|l| l.name == layer).map(|l| l.rows)
    }
}
