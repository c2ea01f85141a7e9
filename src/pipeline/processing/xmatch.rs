//! Batch positional cross-match of a whole table against one catalog.
//!
//! Rows are uploaded in chunks, one request per chunk, instead of one cone
//! search per row. Chunks run concurrently under the context's limits, each
//! writes only its own rows, and the merge happens after every task has
//! joined, so output order is input order whatever the completion order.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::context::EnrichContext;
use crate::app::ports::{BatchQuery, BatchResponse};
use crate::common::constants::XMATCH_SERVICE;
use crate::common::error::Result;
use crate::domain::{CatalogDescriptor, CatalogEntry, Coordinate, Radius, SourceTable};
use crate::observability::metrics;
use crate::pipeline::processing::columns::{claim_prefix, merge_matches, ColumnOptions, ColumnPlan, DuplicatePolicy};
use crate::pipeline::processing::report::{Diagnostic, DiagnosticKind, EnrichOutcome, EnrichStats};

/// Parameters shared by the table enrichment paths.
#[derive(Debug, Clone, Default)]
pub struct EnrichRequest {
    /// Catalog identifier or registry alias.
    pub catalog: String,
    pub radius_arcsec: Option<f64>,
    pub columns: ColumnOptions,
    /// Column prefix; defaults to the catalog's registry alias.
    pub alias: Option<String>,
    pub duplicates: DuplicatePolicy,
}

impl EnrichRequest {
    pub fn new(catalog: impl Into<String>, radius_arcsec: f64) -> Self {
        Self {
            catalog: catalog.into(),
            radius_arcsec: Some(radius_arcsec),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: ColumnOptions) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn allow_repeat(mut self) -> Self {
        self.duplicates = DuplicatePolicy::Suffix;
        self
    }
}

/// Validated form of an [`EnrichRequest`]; built before any request is sent.
#[derive(Debug, Clone)]
pub(crate) struct PreparedStep {
    pub catalog: CatalogDescriptor,
    pub radius: Radius,
    pub prefix: String,
}

pub(crate) fn validate_request(ctx: &EnrichContext, table: &SourceTable, request: &EnrichRequest) -> Result<PreparedStep> {
    let radius = Radius::require(request.radius_arcsec)?;
    let catalog = ctx.resolve_catalog(&request.catalog)?;
    let base = match request.alias.as_deref() {
        Some(alias) => crate::domain::catalog::sanitize_prefix(alias),
        None => catalog.prefix(),
    };
    let planned = request.columns.requested(&catalog).unwrap_or_default();
    let prefix = claim_prefix(table, &base, &planned, request.duplicates)?;
    Ok(PreparedStep { catalog, radius, prefix })
}

/// Splits rows into those with a coordinate and diagnostics for the rest.
pub(crate) fn collect_positions(table: &SourceTable, diagnostics: &mut Vec<Diagnostic>) -> Vec<(usize, Coordinate)> {
    let mut positions = Vec::with_capacity(table.len());
    for (index, row) in table.rows().iter().enumerate() {
        match row.coordinate {
            Some(coordinate) => positions.push((index, coordinate)),
            None => diagnostics.push(Diagnostic::row(
                DiagnosticKind::MissingCoordinate,
                index,
                "row has no coordinate; prepare the table first",
            )),
        }
    }
    positions
}

/// Appends the union of `incoming` to `schema`, keeping first-seen order.
pub(crate) fn extend_schema(schema: &mut Vec<String>, incoming: &[String]) {
    for column in incoming {
        if !schema.contains(column) {
            schema.push(column.clone());
        }
    }
}

/// Keeps `candidate` if it is strictly nearer than the current best; equal
/// separations keep the earlier one.
fn offer(best: &mut Option<CatalogEntry>, candidate: CatalogEntry) {
    let nearer = match best {
        Some(current) => candidate.separation_arcsec < current.separation_arcsec,
        None => true,
    };
    if nearer {
        *best = Some(candidate);
    }
}

pub(crate) fn build_stats(rows: usize, matches: &[Option<CatalogEntry>], failed_rows: usize, chunks: usize, failed_chunks: usize) -> EnrichStats {
    let matched = matches.iter().filter(|m| m.is_some()).count();
    EnrichStats {
        rows,
        matched,
        unmatched: rows.saturating_sub(matched + failed_rows),
        failed: failed_rows,
        chunks,
        failed_chunks,
    }
}

/// Cross-matches every row of `table` against one catalog and appends the
/// nearest match's columns (or sentinels) to a copy of the table.
///
/// Parameter errors are returned before any request. Remote failures are
/// isolated per chunk: those rows get sentinels and a diagnostic, everything
/// else is still merged.
pub async fn cross_match_table(ctx: &EnrichContext, table: &SourceTable, request: &EnrichRequest) -> Result<EnrichOutcome> {
    let step = validate_request(ctx, table, request)?;
    let mut diagnostics = Vec::new();
    let positions = collect_positions(table, &mut diagnostics);
    let missing_rows = diagnostics.len();

    let chunk_size = ctx.chunk_size();
    let chunks: Vec<Vec<(usize, Coordinate)>> = positions.chunks(chunk_size).map(|c| c.to_vec()).collect();
    info!(
        catalog = %step.catalog.id,
        prefix = %step.prefix,
        rows = table.len(),
        chunks = chunks.len(),
        chunk_size,
        "starting cross-match"
    );

    let results = run_chunks(ctx, &step, &chunks).await;

    let mut best: Vec<Option<CatalogEntry>> = vec![None; table.len()];
    let mut schema: Vec<String> = Vec::new();
    let mut any_success = false;
    let mut failed_rows = 0;
    let mut failed_chunks = 0;

    for (chunk_index, (chunk, result)) in chunks.iter().zip(results).enumerate() {
        match result {
            Ok(response) => {
                any_success = true;
                extend_schema(&mut schema, &response.columns);
                let rows: HashSet<usize> = chunk.iter().map(|(row, _)| *row).collect();
                for matched in response.matches {
                    if !rows.contains(&matched.row) {
                        warn!(chunk = chunk_index, row = matched.row, "service returned a row outside the chunk; ignored");
                        continue;
                    }
                    if !step.radius.contains(matched.entry.separation_arcsec) {
                        continue;
                    }
                    offer(&mut best[matched.row], matched.entry);
                }
            }
            Err(e) => {
                failed_chunks += 1;
                failed_rows += chunk.len();
                metrics::xmatch::chunk_failed(&step.catalog.id);
                warn!(chunk = chunk_index, rows = chunk.len(), error = %e, "chunk failed; rows left at sentinel");
                for (row, _) in chunk {
                    diagnostics.push(Diagnostic::chunk_row(
                        DiagnosticKind::RemoteFailure,
                        chunk_index,
                        *row,
                        e.to_string(),
                    ));
                }
            }
        }
    }

    let plan = ColumnPlan::resolve(
        &step.catalog,
        &step.prefix,
        &request.columns,
        any_success.then_some(schema.as_slice()),
        &mut diagnostics,
    )
    .drop_taken(table, &mut diagnostics);
    let merged = merge_matches(table, &plan, &best)?;

    let stats = build_stats(table.len(), &best, failed_rows + missing_rows, chunks.len(), failed_chunks);
    metrics::xmatch::rows_recorded(&step.catalog.id, stats.matched, stats.unmatched, stats.failed);
    info!(
        catalog = %step.catalog.id,
        matched = stats.matched,
        unmatched = stats.unmatched,
        failed = stats.failed,
        failed_chunks,
        "cross-match finished"
    );

    Ok(EnrichOutcome {
        table: merged,
        prefix: step.prefix,
        diagnostics,
        stats,
    })
}

/// Runs every chunk request with bounded concurrency and returns the results
/// indexed by chunk.
async fn run_chunks(
    ctx: &EnrichContext,
    step: &PreparedStep,
    chunks: &[Vec<(usize, Coordinate)>],
) -> Vec<Result<BatchResponse>> {
    let gate = Arc::new(Semaphore::new(ctx.concurrency()));
    let mut tasks = JoinSet::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let ctx = ctx.clone();
        let gate = gate.clone();
        let query = BatchQuery {
            catalog: step.catalog.clone(),
            radius: step.radius,
            positions: chunk.clone(),
        };
        let span = info_span!("xmatch_chunk", chunk = index, rows = chunk.len());
        tasks.spawn(
            async move {
                let _slot = gate.acquire_owned().await.ok();
                metrics::xmatch::chunk_submitted(&query.catalog.id);
                debug!("submitting chunk");
                let result = ctx
                    .throttled_with_retry(XMATCH_SERVICE, || ctx.catalogs().cross_match(&query))
                    .await;
                (index, result)
            }
            .instrument(span),
        );
    }

    let mut results: Vec<Option<Result<BatchResponse>>> = (0..chunks.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "chunk task did not complete"),
        }
    }

    results
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| Err(crate::common::error::EnrichError::remote(XMATCH_SERVICE, "chunk task aborted")))
        })
        .collect()
}
