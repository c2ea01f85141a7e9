use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::context::EnrichContext;
use crate::app::ports::{CatalogResponse, ConeQuery};
use crate::common::constants::VIZIER_SERVICE;
use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogEntry, Coordinate, EnrichmentResult, Radius, SourceTable};
use crate::observability::metrics;
use crate::pipeline::processing::columns::{merge_matches, ColumnPlan};
use crate::pipeline::processing::report::{Diagnostic, DiagnosticKind, EnrichOutcome};
use crate::pipeline::processing::xmatch::{build_stats, collect_positions, extend_schema, validate_request, EnrichRequest};

/// Whether a lookup returns every candidate or only the nearest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    All,
    Nearest,
}

#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    /// Catalog identifier or registry alias.
    pub catalog: String,
    pub radius_arcsec: Option<f64>,
    pub mode: MatchMode,
}

impl LookupRequest {
    pub fn new(catalog: impl Into<String>, radius_arcsec: f64, mode: MatchMode) -> Self {
        Self {
            catalog: catalog.into(),
            radius_arcsec: Some(radius_arcsec),
            mode,
        }
    }
}

/// Keeps entries inside the radius and orders them by separation.
fn collect_result(response: CatalogResponse, radius: Radius, mode: MatchMode) -> EnrichmentResult {
    let entries: Vec<CatalogEntry> = response
        .entries
        .into_iter()
        .filter(|e| radius.contains(e.separation_arcsec))
        .collect();
    let result = EnrichmentResult::new(entries);
    match mode {
        MatchMode::All => result,
        MatchMode::Nearest => result.into_nearest(),
    }
}

/// Searches one catalog around one position.
///
/// An empty result is not an error. Remote failures come back as
/// `RemoteService` for the caller to retry or skip; nothing is retried here.
pub async fn lookup_source(ctx: &EnrichContext, center: Coordinate, request: &LookupRequest) -> Result<EnrichmentResult> {
    let radius = Radius::require(request.radius_arcsec)?;
    let catalog = ctx.resolve_catalog(&request.catalog)?;
    let query = ConeQuery { catalog, center, radius };

    debug!(catalog = %query.catalog.id, %center, %radius, "cone search");
    let response = ctx
        .throttled(VIZIER_SERVICE, ctx.catalogs().cone_search(&query))
        .await?;
    Ok(collect_result(response, radius, request.mode))
}

/// Enriches a table with one cone search per row.
///
/// Same column policy and prefixing as the batch path. A failed lookup is
/// recorded against its row, whose appended cells stay at the sentinel; the
/// other rows are unaffected.
pub async fn enrich_by_lookup(ctx: &EnrichContext, table: &SourceTable, request: &EnrichRequest) -> Result<EnrichOutcome> {
    let step = validate_request(ctx, table, request)?;
    let mut diagnostics = Vec::new();
    let positions = collect_positions(table, &mut diagnostics);
    let missing_rows = diagnostics.len();
    info!(catalog = %step.catalog.id, rows = positions.len(), "starting per-source lookups");

    let gate = Arc::new(Semaphore::new(ctx.concurrency()));
    let mut tasks = JoinSet::new();
    for (row, center) in positions.iter().copied() {
        let ctx = ctx.clone();
        let gate = gate.clone();
        let query = ConeQuery {
            catalog: step.catalog.clone(),
            center,
            radius: step.radius,
        };
        tasks.spawn(async move {
            let _slot = gate.acquire_owned().await.ok();
            let result = ctx
                .throttled_with_retry(VIZIER_SERVICE, || ctx.catalogs().cone_search(&query))
                .await;
            (row, result)
        });
    }

    let mut responses: Vec<Option<Result<CatalogResponse>>> = (0..table.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((row, result)) => responses[row] = Some(result),
            Err(e) => warn!(error = %e, "lookup task did not complete"),
        }
    }

    let mut best: Vec<Option<CatalogEntry>> = vec![None; table.len()];
    let mut schema = Vec::new();
    let mut any_success = false;
    let mut failed_rows = 0;
    for (row, _) in &positions {
        let result = responses[*row]
            .take()
            .unwrap_or_else(|| Err(EnrichError::remote(VIZIER_SERVICE, "lookup task aborted")));
        match result {
            Ok(response) => {
                any_success = true;
                extend_schema(&mut schema, &response.columns);
                best[*row] = collect_result(response, step.radius, MatchMode::Nearest)
                    .entries
                    .into_iter()
                    .next();
            }
            Err(e) => {
                failed_rows += 1;
                warn!(row, error = %e, "lookup failed; row left at sentinel");
                diagnostics.push(Diagnostic::row(DiagnosticKind::RemoteFailure, *row, e.to_string()));
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
    let stats = build_stats(table.len(), &best, failed_rows + missing_rows, positions.len(), failed_rows);
    metrics::xmatch::rows_recorded(&step.catalog.id, stats.matched, stats.unmatched, stats.failed);
    info!(
        catalog = %step.catalog.id,
        matched = stats.matched,
        unmatched = stats.unmatched,
        failed = stats.failed,
        "per-source lookups finished"
    );

    Ok(EnrichOutcome {
        table: merged,
        prefix: step.prefix,
        diagnostics,
        stats,
    })
}
