//! Tabular feature layers.
//!
//! A `Table` is the unit exchanged with partition sources and output writers.
//! Column names are carried exactly as the source dataset spells them; nothing
//! in this crate renames an exported column.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Integral floats below this magnitude convert to `i64` without saturating.
const I64_KEY_LIMIT: f64 = 9.2e18;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Geometry value.
    Geometry(Geometry<f64>),
}

impl Value {
    /// Render the value as an identifier key.
    ///
    /// Integers and integral floats render without a fractional part so that
    /// `101`, `101.0` and `"101"` all compare equal against an id set.
    /// Nulls and geometries have no key.
    pub fn as_key(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Int(v) => Some(Cow::Owned(v.to_string())),
            // Beyond i64 range the cast would saturate and merge distinct ids.
            Self::Float(v) if v.fract() == 0.0 && v.abs() < I64_KEY_LIMIT => {
                Some(Cow::Owned(format!("{}", *v as i64)))
            }
            Self::Float(v) if v.is_finite() => Some(Cow::Owned(v.to_string())),
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            _ => None,
        }
    }

    /// Numeric view of the value, parsing text when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<Geometry<f64>> for Value {
    fn from(v: Geometry<f64>) -> Self {
        Self::Geometry(v)
    }
}

/// Coordinate reference system identifier (for example `EPSG:5070`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    /// Create a CRS identifier.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named-column table of feature rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Column names, in source order.
    pub columns: Vec<String>,
    /// Rows; every row has one value per column.
    pub rows: Vec<Vec<Value>>,
    /// Name of the geometry column, if the table is spatial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_column: Option<String>,
    /// Coordinate reference system of the geometry column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            geometry_column: None,
            crs: None,
        }
    }

    /// Mark a column as the geometry column.
    pub fn with_geometry(mut self, column: impl Into<String>, crs: Option<Crs>) -> Self {
        self.geometry_column = Some(column.into());
        self.crs = crs;
        self
    }

    /// Append a row. Short rows are padded with nulls; long rows are truncated.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Builder form of [`Table::push_row`].
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.push_row(row);
        self
    }

    /// Index of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (`row`, `column`).
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True if the table carries spatial semantics (geometry column and CRS).
    pub fn is_spatial(&self) -> bool {
        self.geometry_column.is_some() && self.crs.is_some()
    }

    /// A table with the same schema and the selected rows.
    pub fn select_rows<'a, I>(&self, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec<Value>>,
    {
        Self {
            columns: self.columns.clone(),
            rows: rows.into_iter().cloned().collect(),
            geometry_column: self.geometry_column.clone(),
            crs: self.crs.clone(),
        }
    }
}
