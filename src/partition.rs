//! Partition selection.
//!
//! The national dataset is split into regional partitions (VPUs). The
//! selector decides which of them hold a resolved origin: from the network
//! index when one is loaded, otherwise by intersecting the origin's geometry
//! with precomputed regional boundaries.

use geo::Intersects;
use geo_types::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::network::NetworkIndex;
use crate::store::{BoxError, FeatureLookup};
use crate::types::{NodeId, PartitionKey, ResolvedOrigin};

/// Error type for partition selection.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// No partition contains the origin.
    #[error("no partition contains origin {0}")]
    PartitionNotFound(NodeId),
    /// The geometry lookup collaborator failed.
    #[error("origin geometry lookup failed")]
    Lookup(#[source] BoxError),
}

/// One regional boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Partition key of the region.
    pub key: PartitionKey,
    /// Region outline.
    pub boundary: MultiPolygon<f64>,
}

/// Precomputed regional polygons, in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionBoundaries {
    regions: Vec<Region>,
}

impl RegionBoundaries {
    /// Create boundaries from regions.
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// Builder: add a region.
    pub fn with_region(mut self, key: impl Into<PartitionKey>, boundary: MultiPolygon<f64>) -> Self {
        self.regions.push(Region { key: key.into(), boundary });
        self
    }

    /// Keys of every region the geometry intersects.
    pub fn intersecting(&self, geometry: &Geometry<f64>) -> BTreeSet<PartitionKey> {
        self.regions
            .iter()
            .filter(|region| geometry.intersects(&region.boundary))
            .map(|region| region.key.clone())
            .collect()
    }

    /// All regions.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// True if no regions are loaded.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Determines which partitions contain an origin.
pub struct PartitionSelector<L: FeatureLookup> {
    lookup: Arc<L>,
    boundaries: Arc<RegionBoundaries>,
}

impl<L: FeatureLookup> PartitionSelector<L> {
    /// Create a selector.
    pub fn new(lookup: Arc<L>, boundaries: Arc<RegionBoundaries>) -> Self {
        Self { lookup, boundaries }
    }

    /// Partition keys containing `origin`, deduplicated and ordered.
    ///
    /// With an index, the `vpu` values of the edges touching the origin.
    /// Without one, the regions intersecting the origin's geometry.
    pub async fn select(
        &self,
        origin: &ResolvedOrigin,
        index: Option<&NetworkIndex>,
    ) -> Result<BTreeSet<PartitionKey>, PartitionError> {
        let keys = match index {
            Some(index) => index.partitions_of(&origin.id),
            None => {
                let geometry = self
                    .lookup
                    .geometry(origin)
                    .await
                    .map_err(|e| PartitionError::Lookup(Box::new(e)))?;
                match geometry {
                    Some(geometry) => self.boundaries.intersecting(&geometry),
                    None => {
                        tracing::warn!(id = %origin.id, "no geometry for origin");
                        BTreeSet::new()
                    }
                }
            }
        };

        if keys.is_empty() {
            return Err(PartitionError::PartitionNotFound(origin.id.clone()));
        }
        tracing::debug!(id = %origin.id, partitions = ?keys, "partitions selected");
        Ok(keys)
    }
}
