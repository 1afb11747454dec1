//! Layer extraction.
//!
//! Feature layers do not agree on which column holds the network id:
//! catchments use `divide_id`, legacy layers `COMID` or `featureid`, nexus
//! points `id`, routing tables `toid`. Every candidate the layer carries is
//! tested, and a row is kept if any of them names a traversal id.

use std::collections::BTreeSet;

use crate::schema::{SchemaError, SchemaNormalizer};
use crate::types::{Crs, NodeId, Table};

/// Candidate id columns, in priority order.
pub const LAYER_ID_COLUMNS: &[&str] = &["divide_id", "COMID", "featureid", "id", "ds_id", "toid"];

/// Filters feature layers against a traversal id set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerExtractor {
    schema: SchemaNormalizer,
}

impl LayerExtractor {
    /// Create an extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `layer` whose id columns name any of `ids`, in source order.
    ///
    /// The result is spatial when the layer has a geometry column and a CRS
    /// is known, either its own or `default_crs`; otherwise it is a plain
    /// table. A layer with no matching rows yields an empty table.
    pub fn extract(
        &self,
        name: &str,
        layer: &Table,
        ids: &BTreeSet<NodeId>,
        default_crs: Option<&Crs>,
    ) -> Result<Table, SchemaError> {
        let candidates = self.schema.present(layer, LAYER_ID_COLUMNS);
        if candidates.is_empty() {
            return Err(SchemaError::NoIdColumn {
                layer: name.to_string(),
                tried: LAYER_ID_COLUMNS,
            });
        }

        let rows = layer.rows.iter().filter(|row| {
            candidates.iter().any(|&col| {
                row.get(col)
                    .and_then(|v| v.as_key())
                    .is_some_and(|key| ids.contains(&*key))
            })
        });
        let mut extracted = layer.select_rows(rows);

        if extracted.geometry_column.is_some() && extracted.crs.is_none() {
            match default_crs {
                Some(crs) => extracted.crs = Some(crs.clone()),
                None => {
                    tracing::warn!(layer = name, "no CRS for geometry layer, returning plain table");
                    extracted.geometry_column = None;
                }
            }
        }

        tracing::debug!(
            layer = name,
            id_columns = candidates.len(),
            rows = extracted.len(),
            of = layer.len(),
            "layer extracted"
        );
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use geo_types::{Geometry, Point};

    fn ids(values: &[&str]) -> BTreeSet<NodeId> {
        values.iter().copied().map(NodeId::from).collect()
    }

    fn point(x: f64) -> Value {
        Value::from(Geometry::Point(Point::new(x, 0.0)))
    }

    #[test]
    fn test_comid_layer_keeps_matching_rows() {
        let layer = Table::new(["COMID", "geometry"])
            .with_geometry("geometry", Some(Crs::new("EPSG:4326")))
            .with_row(vec![Value::Int(101), point(1.0)])
            .with_row(vec![Value::Int(103), point(3.0)]);

        let out = LayerExtractor::new()
            .extract("flowlines", &layer, &ids(&["101", "102"]), None)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0][0], Value::Int(101));
        assert!(out.is_spatial());
    }

    #[test]
    fn test_any_candidate_column_matches() {
        let layer = Table::new(["divide_id", "toid", "areasqkm"])
            .with_row(vec![Value::from("cat-1"), Value::from("nex-1"), Value::Float(1.5)])
            .with_row(vec![Value::from("cat-2"), Value::from("nex-2"), Value::Float(2.5)])
            .with_row(vec![Value::from("cat-3"), Value::from("nex-9"), Value::Float(3.5)]);

        let out = LayerExtractor::new()
            .extract("divides", &layer, &ids(&["cat-3", "nex-1"]), None)
            .unwrap();
        let kept: Vec<_> = out.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(kept, vec![Value::from("cat-1"), Value::from("cat-3")]);
        assert_eq!(out.columns, layer.columns);
    }

    #[test]
    fn test_integral_floats_match_numeric_ids() {
        let layer = Table::new(["featureid"])
            .with_row(vec![Value::Float(101.0)])
            .with_row(vec![Value::Null]);
        let out = LayerExtractor::new().extract("wbd", &layer, &ids(&["101"]), None).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let layer = Table::new(["id"]).with_row(vec![Value::from("nex-5")]);
        let out = LayerExtractor::new().extract("nexus", &layer, &ids(&["nex-1"]), None).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.columns, vec!["id".to_string()]);
    }

    #[test]
    fn test_no_id_column() {
        let layer = Table::new(["name", "geometry"]);
        let err = LayerExtractor::new()
            .extract("lakes", &layer, &ids(&["1"]), None)
            .unwrap_err();
        assert!(matches!(err, SchemaError::NoIdColumn { layer, .. } if layer == "lakes"));
    }

    #[test]
    fn test_crs_resolution() {
        let layer = Table::new(["id", "geometry"])
            .with_geometry("geometry", None)
            .with_row(vec![Value::from("wb-1"), point(0.0)]);
        let extractor = LayerExtractor::new();
        let set = ids(&["wb-1"]);

        let plain = extractor.extract("flowpaths", &layer, &set, None).unwrap();
        assert!(!plain.is_spatial());
        assert!(plain.geometry_column.is_none());
        assert_eq!(plain.len(), 1);

        let default = Crs::new("EPSG:5070");
        let spatial = extractor.extract("flowpaths", &layer, &set, Some(&default)).unwrap();
        assert_eq!(spatial.crs, Some(default));
        assert!(spatial.is_spatial());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let layer = Table::new(["id", "toid"])
            .with_row(vec![Value::from("wb-2"), Value::from("nex-1")])
            .with_row(vec![Value::from("wb-1"), Value::from("nex-1")])
            .with_row(vec![Value::from("wb-3"), Value::from("nex-3")]);
        let set = ids(&["nex-1"]);
        let extractor = LayerExtractor::new();
        let first = extractor.extract("network", &layer, &set, None).unwrap();
        let second = extractor.extract("network", &layer, &set, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.rows[0][0], Value::from("wb-2"));
    }
}
