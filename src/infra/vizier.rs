use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::app::ports::{BatchMatch, BatchQuery, BatchResponse, CatalogResponse, CatalogServicePort, ConeQuery};
use crate::common::constants::{VIZIER_SERVICE, XMATCH_MAX_BATCH_SIZE, XMATCH_SERVICE};
use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogDescriptor, CatalogEntry, Coordinate, Value};
use crate::infra::http_client::read_body;
use crate::infra::tap::{quote_ident, run_sync};

const ROW_COLUMN: &str = "__row";
const UPLOAD_RA_COLUMN: &str = "__ra";
const UPLOAD_DEC_COLUMN: &str = "__dec";
const DISTANCE_COLUMN: &str = "angDist";

/// VizieR cone searches over TAP and batch cross-matches over CDS XMatch
pub struct CdsCatalogClient {
    client: reqwest::Client,
    tap_url: String,
    xmatch_url: String,
}

impl CdsCatalogClient {
    pub fn new(client: reqwest::Client, tap_url: impl Into<String>, xmatch_url: impl Into<String>) -> Self {
        Self {
            client,
            tap_url: tap_url.into(),
            xmatch_url: xmatch_url.into(),
        }
    }
}

pub(crate) fn cone_adql(query: &ConeQuery) -> String {
    let ra = quote_ident(&query.catalog.ra_column);
    let dec = quote_ident(&query.catalog.dec_column);
    format!(
        "SELECT * FROM {table} WHERE 1 = CONTAINS(POINT('ICRS', {ra}, {dec}), CIRCLE('ICRS', {cra:.8}, {cdec:.8}, {r:.10}))",
        table = quote_ident(&query.catalog.id),
        cra = query.center.ra_deg(),
        cdec = query.center.dec_deg(),
        r = query.radius.degrees(),
    )
}

/// Upload table for XMatch: the row index travels with each position so
/// matches can be put back in place.
pub(crate) fn upload_csv(positions: &[(usize, Coordinate)]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([ROW_COLUMN, UPLOAD_RA_COLUMN, UPLOAD_DEC_COLUMN])?;
    for (row, c) in positions {
        writer.write_record([row.to_string(), format!("{:.8}", c.ra_deg()), format!("{:.8}", c.dec_deg())])?;
    }
    writer
        .into_inner()
        .map_err(|e| EnrichError::Io(e.into_error()))
}

/// Parses an XMatch CSV answer: `angDist`, the uploaded columns, then the
/// catalog columns.
pub(crate) fn parse_xmatch_csv(body: &str, catalog: &CatalogDescriptor) -> Result<BatchResponse> {
    let malformed = |msg: String| EnrichError::remote(XMATCH_SERVICE, msg);
    let mut reader = csv::ReaderBuilder::new().from_reader(body.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(format!("unreadable header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let find = |name: &str| headers.iter().position(|h| h == name);
    let (Some(dist_idx), Some(row_idx), Some(ra_idx), Some(dec_idx)) = (
        find(DISTANCE_COLUMN),
        find(ROW_COLUMN),
        find(catalog.ra_column.as_str()),
        find(catalog.dec_column.as_str()),
    ) else {
        return Err(malformed(format!("unexpected columns: {}", headers.join(","))));
    };

    let upload = [DISTANCE_COLUMN, ROW_COLUMN, UPLOAD_RA_COLUMN, UPLOAD_DEC_COLUMN];
    let field_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !upload.contains(&headers[*i].as_str()))
        .collect();
    let columns: Vec<String> = field_idx.iter().map(|i| headers[*i].clone()).collect();

    let mut matches = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(format!("unreadable row: {e}")))?;
        let cell = |i: usize| record.get(i).unwrap_or("");
        let row: usize = cell(row_idx)
            .trim()
            .parse()
            .map_err(|_| malformed(format!("bad row index '{}'", cell(row_idx))))?;
        let separation_arcsec: f64 = cell(dist_idx)
            .trim()
            .parse()
            .map_err(|_| malformed(format!("bad angDist '{}'", cell(dist_idx))))?;
        let (Some(ra), Some(dec)) = (Value::from_field(cell(ra_idx)).as_f64(), Value::from_field(cell(dec_idx)).as_f64()) else {
            return Err(malformed(format!("match for row {row} has no position")));
        };
        let coordinate = Coordinate::new(ra, dec).map_err(|e| malformed(e.to_string()))?;
        let fields = field_idx
            .iter()
            .map(|i| (headers[*i].clone(), Value::from_field(cell(*i))))
            .collect();
        matches.push(BatchMatch {
            row,
            entry: CatalogEntry {
                coordinate,
                fields,
                separation_arcsec,
            },
        });
    }
    Ok(BatchResponse { columns, matches })
}

#[async_trait]
impl CatalogServicePort for CdsCatalogClient {
    async fn cone_search(&self, query: &ConeQuery) -> Result<CatalogResponse> {
        let adql = cone_adql(query);
        let table = run_sync(&self.client, VIZIER_SERVICE, &self.tap_url, &adql).await?;
        let columns = table.columns.clone();
        let entries = table.into_entries(
            VIZIER_SERVICE,
            &query.catalog.ra_column,
            &query.catalog.dec_column,
            Some(query.center),
        )?;
        debug!(catalog = %query.catalog.id, entries = entries.len(), "cone search answered");
        Ok(CatalogResponse { columns, entries })
    }

    async fn cross_match(&self, query: &BatchQuery) -> Result<BatchResponse> {
        if query.positions.is_empty() {
            return Ok(BatchResponse::default());
        }
        let upload = Part::bytes(upload_csv(&query.positions)?)
            .file_name("positions.csv")
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("request", "xmatch")
            .text("distMaxArcsec", query.radius.arcsec().to_string())
            .text("RESPONSEFORMAT", "csv")
            .part("cat1", upload)
            .text("colRA1", UPLOAD_RA_COLUMN)
            .text("colDec1", UPLOAD_DEC_COLUMN)
            .text("cat2", format!("vizier:{}", query.catalog.id));

        let sent = self.client.post(&self.xmatch_url).multipart(form).send().await;
        let body = read_body(XMATCH_SERVICE, sent).await?;
        let response = parse_xmatch_csv(&body, &query.catalog)?;
        debug!(
            catalog = %query.catalog.id,
            uploaded = query.positions.len(),
            matches = response.matches.len(),
            "cross-match answered"
        );
        Ok(response)
    }

    fn max_batch_size(&self) -> usize {
        XMATCH_MAX_BATCH_SIZE
    }
}
