//! CSV reading and writing of source tables.
//!
//! The designation and position columns are named by a [`TableLayout`];
//! every other column is carried through as an extension field. Sentinel
//! (`Null`) cells are written as empty fields.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::common::constants::{DEFAULT_DEC_COLUMN, DEFAULT_DESIGNATION_COLUMN, DEFAULT_RA_COLUMN};
use crate::common::error::{EnrichError, Result};
use crate::domain::{Coordinate, SourceRecord, SourceTable, Value};

fn default_designation_column() -> String {
    DEFAULT_DESIGNATION_COLUMN.to_string()
}

fn default_ra_column() -> String {
    DEFAULT_RA_COLUMN.to_string()
}

fn default_dec_column() -> String {
    DEFAULT_DEC_COLUMN.to_string()
}

/// Names of the core columns in a CSV file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableLayout {
    #[serde(default = "default_designation_column")]
    pub designation_column: String,
    #[serde(default = "default_ra_column")]
    pub ra_column: String,
    #[serde(default = "default_dec_column")]
    pub dec_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            designation_column: default_designation_column(),
            ra_column: default_ra_column(),
            dec_column: default_dec_column(),
        }
    }
}

fn parse_degrees(raw: &str, column: &str, row: usize) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| EnrichError::parse(format!("row {row}: {column} value '{raw}' is not a number")))
}

pub fn read_table<R: Read>(reader: R, layout: &TableLayout) -> Result<SourceTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let find = |name: &str| headers.iter().position(|h| h == name);
    let designation_idx = find(&layout.designation_column);
    let ra_idx = find(&layout.ra_column);
    let dec_idx = find(&layout.dec_column);
    if ra_idx.is_some() != dec_idx.is_some() {
        return Err(EnrichError::invalid(format!(
            "table must have both '{}' and '{}' columns, or neither",
            layout.ra_column, layout.dec_column
        )));
    }

    let core = [designation_idx, ra_idx, dec_idx];
    let extension: Vec<usize> = (0..headers.len()).filter(|i| !core.contains(&Some(*i))).collect();
    let mut table = SourceTable::new(extension.iter().map(|i| headers[*i].clone()).collect());

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");

        let designation = Some(cell(designation_idx))
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let ra = parse_degrees(cell(ra_idx), &layout.ra_column, row)?;
        let dec = parse_degrees(cell(dec_idx), &layout.dec_column, row)?;
        let coordinate = match (ra, dec) {
            (Some(ra), Some(dec)) => Some(
                Coordinate::new(ra, dec).map_err(|e| EnrichError::parse(format!("row {row}: {e}")))?,
            ),
            (None, None) => None,
            _ => {
                return Err(EnrichError::parse(format!(
                    "row {row}: only one of {}/{} is set",
                    layout.ra_column, layout.dec_column
                )))
            }
        };

        let mut source = SourceRecord {
            designation,
            coordinate,
            ..Default::default()
        };
        for i in &extension {
            source
                .fields
                .insert(headers[*i].clone(), Value::from_field(record.get(*i).unwrap_or("")));
        }
        table.push(source);
    }
    Ok(table)
}

pub fn write_table<W: Write>(table: &SourceTable, layout: &TableLayout, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut header = vec![
        layout.designation_column.clone(),
        layout.ra_column.clone(),
        layout.dec_column.clone(),
    ];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header)?;

    for record in table.rows() {
        let mut cells = Vec::with_capacity(header.len());
        cells.push(record.designation.clone().unwrap_or_default());
        match record.coordinate {
            Some(c) => {
                cells.push(c.ra_deg().to_string());
                cells.push(c.dec_deg().to_string());
            }
            None => {
                cells.push(String::new());
                cells.push(String::new());
            }
        }
        for column in table.columns() {
            cells.push(record.field(column).map(Value::to_string).unwrap_or_default());
        }
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv(path: impl AsRef<Path>, layout: &TableLayout) -> Result<SourceTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| EnrichError::Config(format!("cannot open table '{}': {}", path.display(), e)))?;
    let table = read_table(file, layout)?;
    info!(path = %path.display(), rows = table.len(), columns = table.columns().len(), "table loaded");
    Ok(table)
}

pub fn write_csv(table: &SourceTable, path: impl AsRef<Path>, layout: &TableLayout) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_table(table, layout, File::create(path)?)?;
    info!(path = %path.display(), rows = table.len(), "table written");
    Ok(())
}
