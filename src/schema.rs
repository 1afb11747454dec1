//! Column-alias normalization onto the canonical edge schema.
//!
//! Dataset versions spell the same logical field differently (`id`, `ID`,
//! `COMID`). Each logical field has a fixed, ordered alias list; the first
//! alias present in a table wins. Resolution happens once per table, after
//! which rows are read into fixed record types.

use std::fmt;

use crate::network::Subnetwork;
use crate::types::{FlowEdge, LegacyId, NetworkEdge, NodeId, PartitionKey, Table, Value};

/// Logical fields of the canonical edge schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Canonical feature id.
    Id,
    /// Downstream node id.
    ToId,
    /// Legacy numeric id.
    HfId,
    /// Hydrologic-location reference.
    HlUri,
    /// Legacy ordering key.
    HfHydroseq,
    /// Ordering key.
    Hydroseq,
    /// Partition key.
    Vpu,
    /// Legacy ids folded into one feature.
    MemberComid,
}

impl Field {
    /// Aliases for this field, in priority order.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Id => &["id", "ID", "COMID"],
            Self::ToId => &["toid", "toID", "toCOMID"],
            Self::HfId => &["hf_id", "hf_ID"],
            Self::HlUri => &["hl_uri"],
            Self::HfHydroseq => &["hf_hydroseq"],
            Self::Hydroseq => &["hydroseq", "Hydroseq"],
            Self::Vpu => &["vpu", "VPUID", "vpuid"],
            Self::MemberComid => &["member_COMID"],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::ToId => "toid",
            Self::HfId => "hf_id",
            Self::HlUri => "hl_uri",
            Self::HfHydroseq => "hf_hydroseq",
            Self::Hydroseq => "hydroseq",
            Self::Vpu => "vpu",
            Self::MemberComid => "member_COMID",
        };
        f.write_str(name)
    }
}

/// Error type for schema resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A required logical field has no recognized column.
    #[error("no column for `{field}` (tried {tried:?})")]
    MissingColumn {
        /// Logical field.
        field: Field,
        /// Aliases that were tried.
        tried: &'static [&'static str],
    },
    /// A feature layer has none of the candidate id columns.
    #[error("layer `{layer}` has no id column (tried {tried:?})")]
    NoIdColumn {
        /// Layer name.
        layer: String,
        /// Candidate columns that were tried.
        tried: &'static [&'static str],
    },
}

/// Resolves alias columns and reads canonical records from tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaNormalizer;

/// Column positions of the canonical fields in one table.
#[derive(Debug, Clone, Copy)]
struct EdgeColumns {
    id: usize,
    toid: Option<usize>,
    hf_id: Option<usize>,
    hl_uri: Option<usize>,
    hf_hydroseq: Option<usize>,
    hydroseq: Option<usize>,
    vpu: Option<usize>,
    members: Option<usize>,
}

impl SchemaNormalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Position of the first alias of `field` present in `table`.
    pub fn resolve(&self, table: &Table, field: Field) -> Option<usize> {
        Self::first_present(table, field.aliases())
    }

    /// Position of `field`, or a `SchemaError` naming the aliases tried.
    pub fn require(&self, table: &Table, field: Field) -> Result<usize, SchemaError> {
        self.resolve(table, field).ok_or(SchemaError::MissingColumn {
            field,
            tried: field.aliases(),
        })
    }

    /// Positions of every candidate column present, in candidate order.
    pub fn present(&self, table: &Table, candidates: &[&str]) -> Vec<usize> {
        candidates.iter().filter_map(|c| table.column_index(c)).collect()
    }

    fn first_present(table: &Table, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|a| table.column_index(a))
    }

    fn columns(&self, table: &Table) -> Result<EdgeColumns, SchemaError> {
        Ok(EdgeColumns {
            id: self.require(table, Field::Id)?,
            toid: self.resolve(table, Field::ToId),
            hf_id: self.resolve(table, Field::HfId),
            hl_uri: self.resolve(table, Field::HlUri),
            hf_hydroseq: self.resolve(table, Field::HfHydroseq),
            hydroseq: self.resolve(table, Field::Hydroseq),
            vpu: self.resolve(table, Field::Vpu),
            members: self.resolve(table, Field::MemberComid),
        })
    }

    /// Read every row of a network table into canonical edges.
    ///
    /// Rows with a null id are skipped. `member_COMID` is folded into
    /// [`NetworkEdge::members`] and does not survive as a column.
    pub fn normalize_edges(&self, table: &Table) -> Result<Vec<NetworkEdge>, SchemaError> {
        let cols = self.columns(table)?;

        let edges = table
            .rows
            .iter()
            .filter_map(|row| {
                let id = node_id(row.get(cols.id)?)?;
                Some(NetworkEdge {
                    id,
                    toid: cell(row, cols.toid).and_then(node_id),
                    hf_id: cell(row, cols.hf_id).and_then(legacy_id),
                    hl_uri: cell(row, cols.hl_uri).and_then(text),
                    hf_hydroseq: cell(row, cols.hf_hydroseq).and_then(Value::as_f64),
                    hydroseq: cell(row, cols.hydroseq).and_then(Value::as_f64),
                    vpu: cell(row, cols.vpu).and_then(text).map(PartitionKey::new),
                    members: cell(row, cols.members).map(member_ids).unwrap_or_default(),
                })
            })
            .collect();

        Ok(edges)
    }

    /// Project a network table onto its `{id, toid}` subnetwork.
    ///
    /// Both fields are required here, since traversal needs the topology.
    pub fn subnetwork(&self, table: &Table) -> Result<Subnetwork, SchemaError> {
        let id_col = self.require(table, Field::Id)?;
        let toid_col = self.require(table, Field::ToId)?;

        let edges = table
            .rows
            .iter()
            .filter_map(|row| {
                let id = node_id(row.get(id_col)?)?;
                let toid = row.get(toid_col).and_then(node_id);
                Some(FlowEdge::new(id, toid))
            })
            .collect();

        Ok(Subnetwork::new(edges))
    }
}

fn cell(row: &[Value], idx: Option<usize>) -> Option<&Value> {
    idx.and_then(|i| row.get(i))
}

fn node_id(value: &Value) -> Option<NodeId> {
    value
        .as_key()
        .filter(|k| !k.is_empty())
        .map(|k| NodeId::new(k.into_owned()))
}

fn legacy_id(value: &Value) -> Option<LegacyId> {
    match value {
        Value::Int(v) => Some(LegacyId::new(*v)),
        Value::Float(v) if v.is_finite() => Some(LegacyId::new(v.trunc() as i64)),
        Value::Text(s) => LegacyId::parse(s),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_key().filter(|k| !k.is_empty()).map(|k| k.into_owned())
}

/// Parse a `member_COMID` cell: a comma-separated list of legacy ids, each
/// possibly carrying a fractional split suffix (`"1234.1,1235"`).
fn member_ids(value: &Value) -> Vec<LegacyId> {
    match value {
        Value::Text(s) => s.split(',').filter_map(LegacyId::parse).collect(),
        other => legacy_id(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_table(columns: &[&str]) -> Table {
        Table::new(columns.iter().copied())
    }

    #[test]
    fn test_first_alias_wins() {
        let table = network_table(&["COMID", "id", "toCOMID"]);
        let normalizer = SchemaNormalizer::new();
        assert_eq!(normalizer.resolve(&table, Field::Id), Some(1));
        assert_eq!(normalizer.resolve(&table, Field::ToId), Some(2));
    }

    #[test]
    fn test_missing_id_is_schema_error() {
        let table = network_table(&["name", "toid"]);
        let err = SchemaNormalizer::new().normalize_edges(&table).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumn { field: Field::Id, tried: Field::Id.aliases() }
        );
    }

    #[test]
    fn test_normalize_legacy_schema() {
        let table = network_table(&["COMID", "toCOMID", "VPUID", "hf_hydroseq"])
            .with_row(vec![Value::Int(101), Value::Int(102), "01".into(), Value::Float(5.0)])
            .with_row(vec![Value::Int(102), Value::Null, "01".into(), Value::Null]);

        let edges = SchemaNormalizer::new().normalize_edges(&table).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id.as_str(), "101");
        assert_eq!(edges[0].toid, Some(NodeId::from("102")));
        assert_eq!(edges[0].vpu, Some(PartitionKey::from("01")));
        assert_eq!(edges[0].hf_hydroseq, Some(5.0));
        assert_eq!(edges[1].toid, None);
    }

    #[test]
    fn test_member_comid_folds_into_members() {
        let table = network_table(&["id", "toid", "hf_id", "member_COMID"])
            .with_row(vec!["wb-1".into(), "nex-2".into(), Value::Float(10.0), "11.1,12".into()]);

        let edges = SchemaNormalizer::new().normalize_edges(&table).unwrap();
        assert_eq!(edges[0].hf_id, Some(LegacyId::new(10)));
        assert_eq!(edges[0].members, vec![LegacyId::new(11), LegacyId::new(12)]);
        assert!(edges[0].carries_legacy(LegacyId::new(11)));
    }

    #[test]
    fn test_null_id_rows_skipped() {
        let table = network_table(&["id", "toid"])
            .with_row(vec![Value::Null, "nex-1".into()])
            .with_row(vec!["wb-1".into(), "nex-1".into()]);

        let sub = SchemaNormalizer::new().subnetwork(&table).unwrap();
        assert_eq!(sub.len(), 1);
    }

    #[test]
    fn test_subnetwork_requires_toid() {
        let table = network_table(&["id", "vpu"]);
        let err = SchemaNormalizer::new().subnetwork(&table).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { field: Field::ToId, .. }));
    }
}
