// Domain data shapes shared across layers

pub mod catalog;
pub mod sky;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{EnrichError, Result};

pub use catalog::{CatalogDescriptor, CatalogRegistry};
pub use sky::Radius;

/// A scalar table cell. `Null` is the sentinel for "no match found".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Interprets a raw text field (CSV cell, service response cell).
    ///
    /// Integers stay exact so that large catalog identifiers survive; digit
    /// strings with a leading zero are kept verbatim as text.
    pub fn from_field(raw: &str) -> Value {
        let raw = raw.trim();
        if raw.is_empty() {
            return Value::Null;
        }
        let leading_zero = raw.len() > 1 && raw.starts_with('0') && !raw.starts_with("0.");
        if !leading_zero {
            if let Ok(i) = raw.parse::<i64>() {
                return Value::Int(i);
            }
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_nan() {
                return Value::Null;
            }
            if !leading_zero || raw.contains(['.', 'e', 'E']) {
                return Value::Float(f);
            }
        }
        Value::Text(raw.to_string())
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            // Always written with a decimal point or exponent.
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Value::Null
        } else {
            Value::Float(value)
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// An ICRS position in decimal degrees. RA is normalized into [0, 360).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    ra_deg: f64,
    dec_deg: f64,
}

impl Coordinate {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self> {
        if !ra_deg.is_finite() || !dec_deg.is_finite() {
            return Err(EnrichError::parse(format!(
                "coordinate ({ra_deg}, {dec_deg}) is not finite"
            )));
        }
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(EnrichError::parse(format!(
                "declination {dec_deg} is outside [-90, 90]"
            )));
        }
        Ok(Self {
            ra_deg: ra_deg.rem_euclid(360.0),
            dec_deg,
        })
    }

    pub fn ra_deg(&self) -> f64 {
        self.ra_deg
    }

    pub fn dec_deg(&self) -> f64 {
        self.dec_deg
    }

    pub fn separation_arcsec(&self, other: &Coordinate) -> f64 {
        sky::angular_separation_deg(self.ra_deg, self.dec_deg, other.ra_deg, other.dec_deg) * 3600.0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:+.6})", self.ra_deg, self.dec_deg)
    }
}

/// One astronomical source: a fixed core plus an open-ended extension map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    pub designation: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub fields: HashMap<String, Value>,
}

impl SourceRecord {
    pub fn from_designation(designation: impl Into<String>) -> Self {
        Self {
            designation: Some(designation.into()),
            ..Default::default()
        }
    }

    pub fn from_coordinate(coordinate: Coordinate) -> Self {
        Self {
            coordinate: Some(coordinate),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Ordered rows sharing one column schema.
///
/// `columns` lists the extension columns in display order; designation and
/// coordinate live in the record core. Every row holds a value for every
/// column, `Value::Null` when absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceTable {
    columns: Vec<String>,
    rows: Vec<SourceRecord>,
    prefixes: Vec<String>,
}

impl SourceTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            prefixes: Vec::new(),
        }
    }

    pub fn from_records(records: Vec<SourceRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            table.push(record);
        }
        table
    }

    /// Appends a row. Columns unknown to the schema are added to it and
    /// back-filled with nulls on earlier rows.
    pub fn push(&mut self, mut record: SourceRecord) {
        let mut new_columns: Vec<&String> = record
            .fields
            .keys()
            .filter(|k| !self.columns.contains(k))
            .collect();
        new_columns.sort();
        for name in new_columns {
            for row in &mut self.rows {
                row.fields.insert(name.clone(), Value::Null);
            }
            self.columns.push(name.clone());
        }
        for name in &self.columns {
            record.fields.entry(name.clone()).or_insert(Value::Null);
        }
        self.rows.push(record);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[SourceRecord] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [SourceRecord] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.fields.get(column))
    }

    /// Prefixes of the enrichment steps already merged into this table.
    pub fn applied_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Appends new columns filled from `values` (one vector per row, aligned
    /// with `names`). Existing columns are never overwritten.
    pub fn append_columns(&mut self, prefix: &str, names: &[String], values: Vec<Vec<Value>>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EnrichError::invalid(format!(
                "{} value rows supplied for a table of {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        if let Some(existing) = names.iter().find(|n| self.has_column(n)) {
            return Err(EnrichError::invalid(format!(
                "column '{existing}' already exists and would be overwritten"
            )));
        }
        for (row, row_values) in self.rows.iter_mut().zip(values) {
            if row_values.len() != names.len() {
                return Err(EnrichError::invalid(format!(
                    "expected {} values per row, got {}",
                    names.len(),
                    row_values.len()
                )));
            }
            for (name, value) in names.iter().zip(row_values) {
                row.fields.insert(name.clone(), value);
            }
        }
        self.columns.extend(names.iter().cloned());
        self.prefixes.push(prefix.to_string());
        Ok(())
    }
}

/// One record returned by a catalog search around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub coordinate: Coordinate,
    /// Catalog-specific fields in the order the service returned them.
    pub fields: Vec<(String, Value)>,
    pub separation_arcsec: f64,
}

impl CatalogEntry {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Candidates for one source, ordered by ascending separation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub entries: Vec<CatalogEntry>,
}

impl EnrichmentResult {
    /// Sorts candidates by separation. The sort is stable, so equal
    /// separations keep the order the catalog returned them in.
    pub fn new(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| a.separation_arcsec.total_cmp(&b.separation_arcsec));
        Self { entries }
    }

    pub fn nearest(&self) -> Option<&CatalogEntry> {
        self.entries.first()
    }

    /// Keeps only the nearest candidate.
    pub fn into_nearest(mut self) -> Self {
        self.entries.truncate(1);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
