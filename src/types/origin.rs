//! Origin references and resolved origins.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use super::ids::{LegacyId, NodeId, PartitionKey};

/// A user-supplied reference to the feature a subset starts from.
///
/// Exactly one variant is populated per resolution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginReference {
    /// Canonical network id.
    CanonicalId {
        /// The id.
        id: NodeId,
    },
    /// Legacy COMID.
    LegacyComid {
        /// The legacy id.
        comid: LegacyId,
    },
    /// Hydrologic-location URI (for example a gage reference).
    HydroLocation {
        /// The URI.
        uri: String,
    },
    /// Reference to a feature in an external registry.
    FeatureRef {
        /// Registry source (for example `nwissite`).
        source: String,
        /// Feature id within the source.
        id: String,
    },
    /// Longitude/latitude coordinate.
    Coordinate {
        /// Longitude.
        x: f64,
        /// Latitude.
        y: f64,
    },
}

impl OriginReference {
    /// Reference a canonical id.
    pub fn canonical(id: impl Into<NodeId>) -> Self {
        Self::CanonicalId { id: id.into() }
    }

    /// Reference a legacy COMID.
    pub fn comid(comid: i64) -> Self {
        Self::LegacyComid { comid: LegacyId::new(comid) }
    }

    /// Reference a hydrologic location.
    pub fn hydro_location(uri: impl Into<String>) -> Self {
        Self::HydroLocation { uri: uri.into() }
    }

    /// Reference an external feature.
    pub fn feature(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self::FeatureRef { source: source.into(), id: id.into() }
    }

    /// Reference a coordinate.
    pub fn coordinate(x: f64, y: f64) -> Self {
        Self::Coordinate { x, y }
    }
}

impl fmt::Display for OriginReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CanonicalId { id } => write!(f, "id:{}", id),
            Self::LegacyComid { comid } => write!(f, "comid:{}", comid),
            Self::HydroLocation { uri } => write!(f, "hl:{}", uri),
            Self::FeatureRef { source, id } => write!(f, "nldi:{}/{}", source, id),
            Self::Coordinate { x, y } => write!(f, "xy:{},{}", x, y),
        }
    }
}

/// Error parsing an origin reference from text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OriginParseError {
    /// Input was empty.
    #[error("empty origin reference")]
    Empty,
    /// The payload after a known prefix was malformed.
    #[error("malformed {kind} reference: {input}")]
    Malformed {
        /// Prefix that was recognized.
        kind: &'static str,
        /// Full input.
        input: String,
    },
}

fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$")
            .expect("coordinate pattern is valid")
    })
}

impl FromStr for OriginReference {
    type Err = OriginParseError;

    /// Parse `id:<id>`, `comid:<n>`, `hl:<uri>`, `nldi:<source>/<id>` or
    /// `xy:<x>,<y>`. A bare integer is a COMID; any other bare token is a
    /// canonical id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OriginParseError::Empty);
        }
        let malformed = |kind| OriginParseError::Malformed { kind, input: s.to_string() };

        let Some((prefix, rest)) = s.split_once(':') else {
            return Ok(match s.parse::<i64>() {
                Ok(comid) => Self::comid(comid),
                Err(_) => Self::canonical(s),
            });
        };

        match prefix.to_ascii_lowercase().as_str() {
            "id" if !rest.is_empty() => Ok(Self::canonical(rest)),
            "id" => Err(malformed("id")),
            "comid" => rest
                .trim()
                .parse::<i64>()
                .map(Self::comid)
                .map_err(|_| malformed("comid")),
            "hl" if !rest.is_empty() => Ok(Self::hydro_location(rest)),
            "hl" => Err(malformed("hl")),
            "nldi" => match rest.split_once('/') {
                Some((source, id)) if !source.is_empty() && !id.is_empty() => {
                    Ok(Self::feature(source, id))
                }
                _ => Err(malformed("nldi")),
            },
            "xy" => {
                let caps = coordinate_pattern().captures(rest).ok_or_else(|| malformed("xy"))?;
                let x = caps[1].parse().map_err(|_| malformed("xy"))?;
                let y = caps[2].parse().map_err(|_| malformed("xy"))?;
                Ok(Self::coordinate(x, y))
            }
            _ => Ok(Self::canonical(s)),
        }
    }
}

/// A resolved origin: canonical node id plus the partitions containing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOrigin {
    /// Canonical node id. Never empty.
    pub id: NodeId,
    /// Legacy id the origin was resolved through, when known.
    pub legacy_id: Option<LegacyId>,
    /// Partition keys, attached by the partition selector.
    pub partitions: BTreeSet<PartitionKey>,
}

impl ResolvedOrigin {
    /// Create a resolved origin with no partitions yet.
    pub fn new(id: NodeId, legacy_id: Option<LegacyId>) -> Self {
        Self { id, legacy_id, partitions: BTreeSet::new() }
    }

    /// Attach partition keys.
    pub fn with_partitions(mut self, partitions: BTreeSet<PartitionKey>) -> Self {
        self.partitions = partitions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed() {
        assert_eq!("id:wb-10".parse(), Ok(OriginReference::canonical("wb-10")));
        assert_eq!("comid:101".parse(), Ok(OriginReference::comid(101)));
        assert_eq!(
            "hl:Gages-06752260".parse(),
            Ok(OriginReference::hydro_location("Gages-06752260"))
        );
        assert_eq!(
            "nldi:nwissite/USGS-05428500".parse(),
            Ok(OriginReference::feature("nwissite", "USGS-05428500"))
        );
        assert_eq!(
            "xy:-105.1, 40.25".parse(),
            Ok(OriginReference::coordinate(-105.1, 40.25))
        );
    }

    #[test]
    fn test_parse_bare() {
        assert_eq!("101".parse(), Ok(OriginReference::comid(101)));
        assert_eq!("wb-101".parse(), Ok(OriginReference::canonical("wb-101")));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            "comid:abc".parse::<OriginReference>(),
            Err(OriginParseError::Malformed { kind: "comid", .. })
        ));
        assert!(matches!(
            "xy:1".parse::<OriginReference>(),
            Err(OriginParseError::Malformed { kind: "xy", .. })
        ));
        assert!(matches!(
            "nldi:nwissite".parse::<OriginReference>(),
            Err(OriginParseError::Malformed { kind: "nldi", .. })
        ));
        assert_eq!("  ".parse::<OriginReference>(), Err(OriginParseError::Empty));
    }

    #[test]
    fn test_display_parses_back() {
        let refs = [
            OriginReference::canonical("wb-7"),
            OriginReference::comid(42),
            OriginReference::hydro_location("Gages-1"),
            OriginReference::feature("nwissite", "USGS-1"),
            OriginReference::coordinate(-90.5, 35.0),
        ];
        for r in refs {
            assert_eq!(r.to_string().parse::<OriginReference>(), Ok(r));
        }
    }
}
