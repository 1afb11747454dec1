//! Collaborator interfaces: partition data, feature lookup, output writing.
//!
//! The resolution, traversal and extraction core only talks to these traits,
//! so it runs identically against the in-memory backends used in tests and
//! the file-backed ones used by the binary.

pub mod memory;
pub mod json_dir;

use async_trait::async_trait;
use geo_types::Geometry;
use std::path::PathBuf;

use crate::manifest::SubsetManifest;
use crate::types::{LegacyId, PartitionKey, ResolvedOrigin, Table};

/// Boxed error carried as the `source` of collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Source of regional partition datasets.
///
/// `fetch` opens one partition. The returned handle is shared read-only by
/// every layer extraction of one operation and dropped before the operation
/// returns.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Error type for fetch and read operations.
    type Error: std::error::Error + Send + Sync + 'static;
    /// Handle to one opened partition.
    type Dataset: PartitionDataset<Error = Self::Error>;

    /// Open the partition identified by `key`.
    async fn fetch(&self, key: &PartitionKey) -> Result<Self::Dataset, Self::Error>;
}

/// An opened regional dataset.
#[async_trait]
pub trait PartitionDataset: Send + Sync + 'static {
    /// Error type for read operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Key of the partition this dataset holds.
    fn key(&self) -> &PartitionKey;

    /// Read a layer by name. `Ok(None)` if the partition has no such layer.
    async fn read_layer(&self, name: &str) -> Result<Option<Table>, Self::Error>;
}

/// Geometry and feature lookup service.
///
/// Resolves coordinates and external feature references to legacy ids, and
/// supplies origin geometry for spatial partition selection.
#[async_trait]
pub trait FeatureLookup: Send + Sync {
    /// Error type for lookups.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Legacy id of the feature containing the coordinate.
    async fn legacy_id_at(&self, x: f64, y: f64) -> Result<Option<LegacyId>, Self::Error>;

    /// Legacy id of an external registry feature.
    async fn legacy_id_for_feature(
        &self,
        source: &str,
        id: &str,
    ) -> Result<Option<LegacyId>, Self::Error>;

    /// Geometry of a resolved origin.
    async fn geometry(&self, origin: &ResolvedOrigin) -> Result<Option<Geometry<f64>>, Self::Error>;
}

/// Output sink for extracted layers.
///
/// Takes `&mut self`: exactly one writer call is in flight at a time.
#[async_trait]
pub trait LayerWriter: Send {
    /// Error type for write operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist one extracted layer.
    async fn write_layer(&mut self, name: &str, table: &Table) -> Result<(), Self::Error>;

    /// Finish the container and return its path.
    async fn finish(&mut self, manifest: &SubsetManifest) -> Result<PathBuf, Self::Error>;
}

/// Error returned by [`NoFeatureLookup`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("no feature lookup service configured for {0}")]
pub struct LookupUnavailable(&'static str);

/// Feature lookup that supports nothing.
///
/// For setups where every origin is an id resolvable against the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeatureLookup;

#[async_trait]
impl FeatureLookup for NoFeatureLookup {
    type Error = LookupUnavailable;

    async fn legacy_id_at(&self, _x: f64, _y: f64) -> Result<Option<LegacyId>, Self::Error> {
        Err(LookupUnavailable("coordinates"))
    }

    async fn legacy_id_for_feature(
        &self,
        _source: &str,
        _id: &str,
    ) -> Result<Option<LegacyId>, Self::Error> {
        Err(LookupUnavailable("feature references"))
    }

    async fn geometry(&self, _origin: &ResolvedOrigin) -> Result<Option<Geometry<f64>>, Self::Error> {
        Err(LookupUnavailable("origin geometry"))
    }
}

pub use memory::{InMemoryFeatureLookup, InMemoryLayerWriter, InMemoryPartitionSource};
pub use json_dir::{JsonDirSource, JsonDirWriter};
