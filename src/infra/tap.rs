//! Synchronous TAP queries against the CDS services.
//!
//! Queries are posted to `<base>/sync` with `FORMAT=json`. The answer carries
//! `metadata` (one object per column, with a `name`) and `data` (one array
//! per row, aligned with `metadata`).

use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogEntry, Coordinate, Value};
use crate::infra::http_client::read_body;

#[derive(Debug, Deserialize)]
struct TapColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TapDocument {
    metadata: Vec<TapColumn>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

/// Decoded TAP result table.
#[derive(Debug, Clone, Default)]
pub struct TapTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TapTable {
    pub fn decode(service: &str, body: &str) -> Result<Self> {
        let doc: TapDocument = serde_json::from_str(body)
            .map_err(|e| EnrichError::remote(service, format!("malformed TAP response: {e}")))?;
        let columns: Vec<String> = doc.metadata.into_iter().map(|c| c.name).collect();
        if let Some(bad) = doc.data.iter().position(|row| row.len() != columns.len()) {
            return Err(EnrichError::remote(
                service,
                format!("TAP row {bad} has {} cells for {} columns", doc.data[bad].len(), columns.len()),
            ));
        }
        Ok(Self { columns, rows: doc.data })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Converts rows to catalog entries positioned by `ra_column`/`dec_column`.
    ///
    /// With a `center`, the separation is computed from it; without one (name
    /// queries) it is 0. Rows without a usable position are skipped.
    pub fn into_entries(self, service: &str, ra_column: &str, dec_column: &str, center: Option<Coordinate>) -> Result<Vec<CatalogEntry>> {
        let (Some(ra_idx), Some(dec_idx)) = (self.index_of(ra_column), self.index_of(dec_column)) else {
            return Err(EnrichError::remote(
                service,
                format!("response lacks position columns {ra_column}/{dec_column}"),
            ));
        };

        let mut entries = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.into_iter().enumerate() {
            let ra = Value::from_json(&row[ra_idx]).as_f64();
            let dec = Value::from_json(&row[dec_idx]).as_f64();
            let coordinate = match (ra, dec) {
                (Some(ra), Some(dec)) => match Coordinate::new(ra, dec) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(service, row = index, error = %e, "skipping entry with invalid position");
                        continue;
                    }
                },
                _ => {
                    debug!(service, row = index, "skipping entry without position");
                    continue;
                }
            };
            let fields = self
                .columns
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.clone(), Value::from_json(cell)))
                .collect();
            entries.push(CatalogEntry {
                coordinate,
                fields,
                separation_arcsec: center.map(|c| c.separation_arcsec(&coordinate)).unwrap_or(0.0),
            });
        }
        Ok(entries)
    }
}

/// Runs one ADQL query through the TAP `sync` endpoint at `base_url`.
pub async fn run_sync(client: &reqwest::Client, service: &str, base_url: &str, adql: &str) -> Result<TapTable> {
    let url = format!("{}/sync", base_url.trim_end_matches('/'));
    debug!(service, %url, adql, "TAP query");
    let sent = client
        .post(&url)
        .form(&[
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", "json"),
            ("QUERY", adql),
        ])
        .send()
        .await;
    let body = read_body(service, sent).await?;
    TapTable::decode(service, &body)
}

/// Quotes an identifier (table or column name) for ADQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for ADQL.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "metadata": [{"name": "RAJ2000"}, {"name": "DEJ2000"}, {"name": "Jmag"}, {"name": "_2MASS"}],
        "data": [
            [89.829782, -14.080239, 13.80, "05591914-1404488"],
            [89.831000, -14.081000, null, "05591944-1404516"],
            [null, -14.0, 12.0, "broken"]
        ]
    }"#;

    #[test]
    fn test_decode_and_convert() {
        let table = TapTable::decode("vizier", BODY).unwrap();
        assert_eq!(table.columns.len(), 4);

        let center = Coordinate::new(89.82975, -14.08022).unwrap();
        let entries = table.into_entries("vizier", "RAJ2000", "DEJ2000", Some(center)).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].separation_arcsec < 0.2);
        assert_eq!(entries[0].field("Jmag"), Some(&Value::Float(13.8)));
        assert_eq!(entries[1].field("Jmag"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_position_column_is_remote_error() {
        let table = TapTable::decode("vizier", BODY).unwrap();
        let err = table.into_entries("vizier", "RA_ICRS", "DE_ICRS", None).unwrap_err();
        assert!(err.is_remote());
    }

    #[test]
    fn test_malformed_body_is_remote_error() {
        assert!(TapTable::decode("simbad", "<VOTABLE/>").unwrap_err().is_remote());
        let ragged = r#"{"metadata": [{"name": "a"}], "data": [[1, 2]]}"#;
        assert!(TapTable::decode("simbad", ragged).unwrap_err().is_remote());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("II/246/out"), "\"II/246/out\"");
        assert_eq!(quote_literal("Barnard's star"), "'Barnard''s star'");
    }
}
