//! Origin resolution.
//!
//! Turns any [`OriginReference`] into the canonical node id a traversal
//! starts from. Resolution is a pure function of the supplied network index,
//! except for coordinate and external-feature references, which need a
//! [`FeatureLookup`] to produce a legacy id first.
//!
//! Whenever several edges match, the one with the highest legacy ordering key
//! (`hf_hydroseq`) wins; ties go to the smallest id.

use std::sync::Arc;

use crate::network::{best_match, NetworkIndex};
use crate::store::{BoxError, FeatureLookup};
use crate::types::{LegacyId, NodeId, OriginReference, ResolvedOrigin};

/// Error type for origin resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No candidate matched the reference.
    #[error("origin not found: {0}")]
    OriginNotFound(OriginReference),
    /// The reference can only be resolved against a network index.
    #[error("resolving {0} requires a network index")]
    IndexRequired(OriginReference),
    /// The feature lookup collaborator failed.
    #[error("feature lookup failed")]
    Lookup(#[source] BoxError),
}

impl ResolveError {
    fn lookup<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Lookup(Box::new(e))
    }
}

/// Resolves origin references to canonical node ids.
pub struct OriginResolver<L: FeatureLookup> {
    lookup: Arc<L>,
}

impl<L: FeatureLookup> OriginResolver<L> {
    /// Create a resolver backed by a feature lookup.
    pub fn new(lookup: Arc<L>) -> Self {
        Self { lookup }
    }

    /// Resolve `reference`, consulting `index` when one is available.
    ///
    /// Fails with [`ResolveError::OriginNotFound`] if no candidate matches;
    /// nothing is retried.
    pub async fn resolve(
        &self,
        reference: &OriginReference,
        index: Option<&NetworkIndex>,
    ) -> Result<ResolvedOrigin, ResolveError> {
        let resolved = match reference {
            OriginReference::CanonicalId { id } => match index {
                Some(index) => from_canonical(index, id),
                None => {
                    tracing::debug!(id = %id, "no network index, using id directly");
                    Some(ResolvedOrigin::new(id.clone(), LegacyId::parse(id.as_str())))
                }
            },
            OriginReference::LegacyComid { comid } => from_legacy_or_passthrough(index, *comid),
            OriginReference::HydroLocation { uri } => {
                let index = index.ok_or_else(|| ResolveError::IndexRequired(reference.clone()))?;
                from_hl_uri(index, uri)
            }
            OriginReference::FeatureRef { source, id } => self
                .lookup
                .legacy_id_for_feature(source, id)
                .await
                .map_err(ResolveError::lookup)?
                .and_then(|legacy| from_legacy_or_passthrough(index, legacy)),
            OriginReference::Coordinate { x, y } => self
                .lookup
                .legacy_id_at(*x, *y)
                .await
                .map_err(ResolveError::lookup)?
                .and_then(|legacy| from_legacy_or_passthrough(index, legacy)),
        };

        match resolved.filter(|origin| !origin.id.is_empty()) {
            Some(origin) => {
                tracing::debug!(
                    reference = %reference,
                    id = %origin.id,
                    legacy_id = ?origin.legacy_id,
                    "origin resolved"
                );
                Ok(origin)
            }
            None => Err(ResolveError::OriginNotFound(reference.clone())),
        }
    }

    /// Get a reference to the lookup.
    pub fn lookup(&self) -> &L {
        &self.lookup
    }
}

/// Canonical id: best edge touching the id, then its legacy id re-resolved.
///
/// A hydrologic-location outlet is already canonical and resolves to itself.
fn from_canonical(index: &NetworkIndex, id: &NodeId) -> Option<ResolvedOrigin> {
    if index.is_location_outlet(id) {
        return Some(ResolvedOrigin::new(id.clone(), None));
    }
    let edge = best_match(index.touching(id))?;
    match edge.hf_id {
        Some(legacy) => from_legacy(index, legacy)
            .or_else(|| Some(ResolvedOrigin::new(edge.id.clone(), Some(legacy)))),
        None => Some(ResolvedOrigin::new(edge.id.clone(), None)),
    }
}

fn from_legacy(index: &NetworkIndex, legacy: LegacyId) -> Option<ResolvedOrigin> {
    let edge = best_match(index.with_legacy(legacy))?;
    Some(ResolvedOrigin::new(edge.id.clone(), Some(legacy)))
}

fn from_legacy_or_passthrough(index: Option<&NetworkIndex>, legacy: LegacyId) -> Option<ResolvedOrigin> {
    match index {
        Some(index) => from_legacy(index, legacy),
        None => Some(ResolvedOrigin::new(NodeId::from(legacy), Some(legacy))),
    }
}

/// Hydrologic locations map to the node downstream of the matching edge.
///
/// The edge's `hf_id` belongs to the upstream feature, so it is only carried
/// when the edge has no `toid` and is itself the origin.
fn from_hl_uri(index: &NetworkIndex, uri: &str) -> Option<ResolvedOrigin> {
    let edge = best_match(index.with_hl_uri(uri))?;
    Some(match &edge.toid {
        Some(toid) => ResolvedOrigin::new(toid.clone(), None),
        None => ResolvedOrigin::new(edge.id.clone(), edge.hf_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryFeatureLookup;
    use crate::store::NoFeatureLookup;
    use crate::types::NetworkEdge;

    fn index() -> NetworkIndex {
        NetworkIndex::new(vec![
            NetworkEdge::new("wb-1", Some("nex-1".into())).with_hf_id(101).with_hf_hydroseq(10.0),
            NetworkEdge::new("wb-1", Some("nex-1".into())).with_hf_id(102).with_hf_hydroseq(12.0),
            NetworkEdge::new("wb-2", Some("nex-2".into())).with_hf_id(201).with_hf_hydroseq(4.0),
            NetworkEdge::new("nex-1", Some("wb-2".into())),
            NetworkEdge::new("wb-3", Some("nex-3".into()))
                .with_hf_id(301)
                .with_hf_hydroseq(5.0)
                .with_hl_uri("Gages-A"),
            NetworkEdge::new("wb-4", Some("nex-4".into()))
                .with_hf_id(401)
                .with_hf_hydroseq(9.0)
                .with_hl_uri("Gages-A"),
        ])
    }

    fn resolver() -> OriginResolver<NoFeatureLookup> {
        OriginResolver::new(Arc::new(NoFeatureLookup))
    }

    #[tokio::test]
    async fn test_canonical_picks_highest_key() {
        let index = index();
        let origin = resolver()
            .resolve(&OriginReference::canonical("wb-1"), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-1");
        assert_eq!(origin.legacy_id, Some(LegacyId::new(102)));
    }

    #[tokio::test]
    async fn test_canonical_without_index_passes_through() {
        let origin = resolver()
            .resolve(&OriginReference::canonical("wb-77"), None)
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-77");
        assert_eq!(origin.legacy_id, None);
    }

    #[tokio::test]
    async fn test_legacy_comid() {
        let index = index();
        let origin = resolver()
            .resolve(&OriginReference::comid(201), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-2");

        let passthrough = resolver().resolve(&OriginReference::comid(201), None).await.unwrap();
        assert_eq!(passthrough.id.as_str(), "201");
    }

    #[tokio::test]
    async fn test_hl_uri_takes_toid_of_best_edge() {
        let index = index();
        let origin = resolver()
            .resolve(&OriginReference::hydro_location("Gages-A"), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "nex-4");
        // 401 identifies wb-4, not the nexus it drains into.
        assert_eq!(origin.legacy_id, None);
    }

    #[tokio::test]
    async fn test_hl_uri_without_toid_keeps_edge() {
        let index = NetworkIndex::new(vec![NetworkEdge::new("wb-8", None)
            .with_hf_id(801)
            .with_hl_uri("Gages-T")]);
        let origin = resolver()
            .resolve(&OriginReference::hydro_location("Gages-T"), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-8");
        assert_eq!(origin.legacy_id, Some(LegacyId::new(801)));
    }

    #[tokio::test]
    async fn test_canonical_matched_through_toid() {
        // `nex-9` has no edge of its own with a key; the best edge drains into it.
        let index = NetworkIndex::new(vec![
            NetworkEdge::new("wb-7", Some("nex-9".into())).with_hf_id(701).with_hf_hydroseq(2.0),
            NetworkEdge::new("wb-8", Some("nex-9".into())).with_hf_id(801).with_hf_hydroseq(6.0),
            NetworkEdge::new("nex-9", Some("wb-10".into())),
        ]);
        let origin = resolver()
            .resolve(&OriginReference::canonical("nex-9"), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-8");
        assert_eq!(origin.legacy_id, Some(LegacyId::new(801)));
    }

    #[tokio::test]
    async fn test_hl_uri_requires_index() {
        let err = resolver()
            .resolve(&OriginReference::hydro_location("Gages-A"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::IndexRequired(_)));
    }

    #[tokio::test]
    async fn test_unknown_origin() {
        let index = index();
        for reference in [
            OriginReference::canonical("wb-999"),
            OriginReference::comid(999),
            OriginReference::hydro_location("Gages-Z"),
        ] {
            let err = resolver().resolve(&reference, Some(&index)).await.unwrap_err();
            assert!(matches!(err, ResolveError::OriginNotFound(r) if r == reference));
        }
    }

    #[tokio::test]
    async fn test_coordinate_goes_through_lookup() {
        let index = index();
        let lookup = InMemoryFeatureLookup::new().with_point(-90.0, 35.0, 301);
        let resolver = OriginResolver::new(Arc::new(lookup));

        let origin = resolver
            .resolve(&OriginReference::coordinate(-90.0, 35.0), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-3");

        let miss = resolver
            .resolve(&OriginReference::coordinate(0.0, 0.0), Some(&index))
            .await
            .unwrap_err();
        assert!(matches!(miss, ResolveError::OriginNotFound(_)));
    }

    #[tokio::test]
    async fn test_feature_ref_goes_through_lookup() {
        let index = index();
        let lookup = InMemoryFeatureLookup::new().with_feature("nwissite", "USGS-4", 401);
        let resolver = OriginResolver::new(Arc::new(lookup));

        let origin = resolver
            .resolve(&OriginReference::feature("nwissite", "USGS-4"), Some(&index))
            .await
            .unwrap();
        assert_eq!(origin.id.as_str(), "wb-4");
        assert_eq!(origin.legacy_id, Some(LegacyId::new(401)));

        let passthrough = resolver
            .resolve(&OriginReference::feature("nwissite", "USGS-4"), None)
            .await
            .unwrap();
        assert_eq!(passthrough.id.as_str(), "401");

        let miss = resolver
            .resolve(&OriginReference::feature("nwissite", "USGS-0"), Some(&index))
            .await
            .unwrap_err();
        assert!(matches!(miss, ResolveError::OriginNotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_cause() {
        let err = resolver()
            .resolve(&OriginReference::feature("nwissite", "USGS-1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Lookup(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let index = index();
        let resolver = resolver();
        for reference in [
            OriginReference::canonical("wb-1"),
            OriginReference::comid(301),
            OriginReference::hydro_location("Gages-A"),
        ] {
            let first = resolver.resolve(&reference, Some(&index)).await.unwrap();
            let again = resolver
                .resolve(&OriginReference::CanonicalId { id: first.id.clone() }, Some(&index))
                .await
                .unwrap();
            assert_eq!(first.id, again.id, "re-resolving {}", reference);
        }
    }

    #[tokio::test]
    async fn test_location_outlet_with_downstream_edge_is_stable() {
        let index = NetworkIndex::new(vec![
            NetworkEdge::new("wb-10", Some("nex-10".into())).with_hl_uri("HUC12-A").with_hf_hydroseq(5.0),
            NetworkEdge::new("wb-11", Some("nex-11".into()))
                .with_hf_id(1101)
                .with_hl_uri("HUC12-A")
                .with_hf_hydroseq(9.0),
            NetworkEdge::new("nex-11", Some("wb-12".into())),
        ]);
        let resolver = resolver();

        let first = resolver
            .resolve(&OriginReference::hydro_location("HUC12-A"), Some(&index))
            .await
            .unwrap();
        assert_eq!(first.id.as_str(), "nex-11");

        let again = resolver
            .resolve(&OriginReference::CanonicalId { id: first.id.clone() }, Some(&index))
            .await
            .unwrap();
        assert_eq!(again.id.as_str(), "nex-11");
        assert_eq!(again.legacy_id, None);
    }
}
