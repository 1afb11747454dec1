//! In-memory collaborators for testing.

use async_trait::async_trait;
use geo_types::Geometry;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{FeatureLookup, LayerWriter, PartitionDataset, PartitionSource};
use crate::manifest::SubsetManifest;
use crate::types::{LegacyId, NodeId, PartitionKey, ResolvedOrigin, Table};

/// Error type for in-memory collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    /// Partition not found.
    #[error("partition not found: {0}")]
    PartitionNotFound(PartitionKey),
    /// Injected read failure.
    #[error("read of layer `{layer}` in partition {partition} failed")]
    ReadFailed {
        /// Partition key.
        partition: PartitionKey,
        /// Layer name.
        layer: String,
    },
    /// Injected write failure.
    #[error("write of layer `{0}` failed")]
    WriteFailed(String),
}

type Layers = BTreeMap<String, Table>;

/// In-memory partition source.
///
/// Uses BTreeMap for deterministic iteration order. Counts open dataset
/// handles and records every fetched key so tests can check scoped release
/// and partition selection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitionSource {
    partitions: BTreeMap<PartitionKey, Arc<Layers>>,
    failing_layers: Arc<BTreeSet<String>>,
    open_handles: Arc<AtomicUsize>,
    fetched: Arc<Mutex<Vec<PartitionKey>>>,
}

impl InMemoryPartitionSource {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a layer in a partition.
    pub fn add_layer(&mut self, key: impl Into<PartitionKey>, name: impl Into<String>, table: Table) {
        let layers = self.partitions.entry(key.into()).or_default();
        Arc::make_mut(layers).insert(name.into(), table);
    }

    /// Builder form of [`InMemoryPartitionSource::add_layer`].
    pub fn with_layer(mut self, key: &str, name: &str, table: Table) -> Self {
        self.add_layer(PartitionKey::from(key), name, table);
        self
    }

    /// Make every read of `layer` fail.
    pub fn fail_layer(mut self, layer: &str) -> Self {
        Arc::make_mut(&mut self.failing_layers).insert(layer.to_string());
        self
    }

    /// Number of dataset handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Keys fetched so far, in fetch order.
    pub fn fetched(&self) -> Vec<PartitionKey> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl PartitionSource for InMemoryPartitionSource {
    type Error = InMemoryError;
    type Dataset = InMemoryDataset;

    async fn fetch(&self, key: &PartitionKey) -> Result<Self::Dataset, Self::Error> {
        self.fetched.lock().push(key.clone());
        let layers = self
            .partitions
            .get(key)
            .cloned()
            .ok_or_else(|| InMemoryError::PartitionNotFound(key.clone()))?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryDataset {
            key: key.clone(),
            layers,
            failing_layers: Arc::clone(&self.failing_layers),
            open_handles: Arc::clone(&self.open_handles),
        })
    }
}

/// Open handle to an in-memory partition. Releases its count on drop.
#[derive(Debug)]
pub struct InMemoryDataset {
    key: PartitionKey,
    layers: Arc<Layers>,
    failing_layers: Arc<BTreeSet<String>>,
    open_handles: Arc<AtomicUsize>,
}

#[async_trait]
impl PartitionDataset for InMemoryDataset {
    type Error = InMemoryError;

    fn key(&self) -> &PartitionKey {
        &self.key
    }

    async fn read_layer(&self, name: &str) -> Result<Option<Table>, Self::Error> {
        if self.failing_layers.contains(name) {
            return Err(InMemoryError::ReadFailed {
                partition: self.key.clone(),
                layer: name.to_string(),
            });
        }
        Ok(self.layers.get(name).cloned())
    }
}

impl Drop for InMemoryDataset {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory layer writer. Records every call in order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLayerWriter {
    written: Vec<(String, Table)>,
    manifest: Option<SubsetManifest>,
    fail_on: Option<String>,
}

impl InMemoryLayerWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to write `layer`.
    pub fn failing_on(layer: &str) -> Self {
        Self { fail_on: Some(layer.to_string()), ..Self::default() }
    }

    /// Layers written so far, in write order.
    pub fn written(&self) -> &[(String, Table)] {
        &self.written
    }

    /// Manifest passed to `finish`, if it was called.
    pub fn manifest(&self) -> Option<&SubsetManifest> {
        self.manifest.as_ref()
    }
}

#[async_trait]
impl LayerWriter for InMemoryLayerWriter {
    type Error = InMemoryError;

    async fn write_layer(&mut self, name: &str, table: &Table) -> Result<(), Self::Error> {
        if self.fail_on.as_deref() == Some(name) {
            return Err(InMemoryError::WriteFailed(name.to_string()));
        }
        self.written.push((name.to_string(), table.clone()));
        Ok(())
    }

    async fn finish(&mut self, manifest: &SubsetManifest) -> Result<PathBuf, Self::Error> {
        self.manifest = Some(manifest.clone());
        Ok(PathBuf::from(format!("memory://{}", manifest.subset_id)))
    }
}

/// In-memory feature lookup keyed by exact coordinates and feature refs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureLookup {
    points: BTreeMap<(u64, u64), LegacyId>,
    features: BTreeMap<(String, String), LegacyId>,
    geometries: BTreeMap<NodeId, Geometry<f64>>,
}

impl InMemoryFeatureLookup {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a coordinate to a legacy id.
    pub fn with_point(mut self, x: f64, y: f64, legacy: i64) -> Self {
        self.points.insert((x.to_bits(), y.to_bits()), LegacyId::new(legacy));
        self
    }

    /// Map an external feature reference to a legacy id.
    pub fn with_feature(mut self, source: &str, id: &str, legacy: i64) -> Self {
        self.features
            .insert((source.to_string(), id.to_string()), LegacyId::new(legacy));
        self
    }

    /// Register the geometry of an origin id.
    pub fn with_geometry(mut self, id: &str, geometry: Geometry<f64>) -> Self {
        self.geometries.insert(NodeId::from(id), geometry);
        self
    }
}

#[async_trait]
impl FeatureLookup for InMemoryFeatureLookup {
    type Error = Infallible;

    async fn legacy_id_at(&self, x: f64, y: f64) -> Result<Option<LegacyId>, Self::Error> {
        Ok(self.points.get(&(x.to_bits(), y.to_bits())).copied())
    }

    async fn legacy_id_for_feature(
        &self,
        source: &str,
        id: &str,
    ) -> Result<Option<LegacyId>, Self::Error> {
        Ok(self.features.get(&(source.to_string(), id.to_string())).copied())
    }

    async fn geometry(&self, origin: &ResolvedOrigin) -> Result<Option<Geometry<f64>>, Self::Error> {
        Ok(self.geometries.get(&origin.id).cloned())
    }
}
