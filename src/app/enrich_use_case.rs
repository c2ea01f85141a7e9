use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::app::context::EnrichContext;
use crate::common::error::Result;
use crate::domain::SourceTable;
use crate::pipeline::processing::lookup::enrich_by_lookup;
use crate::pipeline::processing::report::{Diagnostic, EnrichOutcome, EnrichStats};
use crate::pipeline::processing::xmatch::{cross_match_table, EnrichRequest};

/// How a step queries its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMethod {
    /// Chunked batch cross-match.
    #[default]
    Xmatch,
    /// One cone search per row.
    Lookup,
}

#[derive(Debug, Clone)]
pub struct EnrichStep {
    pub request: EnrichRequest,
    pub method: StepMethod,
}

impl EnrichStep {
    pub fn xmatch(request: EnrichRequest) -> Self {
        Self {
            request,
            method: StepMethod::Xmatch,
        }
    }

    pub fn lookup(request: EnrichRequest) -> Self {
        Self {
            request,
            method: StepMethod::Lookup,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub catalog: String,
    pub prefix: String,
    pub method: StepMethod,
    pub stats: EnrichStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of one enrichment run, written as JSON beside the output table
#[derive(Debug, Clone, Serialize)]
pub struct EnrichReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub steps: Vec<StepReport>,
}

impl EnrichReport {
    pub fn total_diagnostics(&self) -> usize {
        self.steps.iter().map(|s| s.diagnostics.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Use case for enriching one table against several catalogs in sequence
pub struct EnrichUseCase {
    ctx: EnrichContext,
    steps: Vec<EnrichStep>,
}

impl EnrichUseCase {
    pub fn new(ctx: EnrichContext, steps: Vec<EnrichStep>) -> Self {
        Self { ctx, steps }
    }

    async fn run_step(&self, table: &SourceTable, step: &EnrichStep) -> Result<EnrichOutcome> {
        match step.method {
            StepMethod::Xmatch => cross_match_table(&self.ctx, table, &step.request).await,
            StepMethod::Lookup => enrich_by_lookup(&self.ctx, table, &step.request).await,
        }
    }

    /// Runs every step over the table. A step that fails validation stops
    /// the run; remote failures inside a step only produce diagnostics.
    pub async fn execute(&self, table: SourceTable) -> Result<(SourceTable, EnrichReport)> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let rows = table.len();
        info!(%run_id, rows, steps = self.steps.len(), "enrichment run started");

        let mut table = table;
        let mut reports = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let span = info_span!("enrich_step", step = index, catalog = %step.request.catalog);
            let outcome = self.run_step(&table, step).instrument(span).await?;
            reports.push(StepReport {
                catalog: step.request.catalog.clone(),
                prefix: outcome.prefix,
                method: step.method,
                stats: outcome.stats,
                diagnostics: outcome.diagnostics,
            });
            table = outcome.table;
        }

        let report = EnrichReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            rows,
            steps: reports,
        };
        info!(
            %run_id,
            columns = table.columns().len(),
            diagnostics = report.total_diagnostics(),
            "enrichment run finished"
        );
        Ok((table, report))
    }

    /// Get aggregate statistics across the steps of a report
    pub fn get_run_stats(report: &EnrichReport) -> EnrichRunStats {
        let mut stats = EnrichRunStats {
            steps: report.steps.len(),
            ..Default::default()
        };
        for step in &report.steps {
            stats.rows_matched += step.stats.matched;
            stats.rows_unmatched += step.stats.unmatched;
            stats.rows_failed += step.stats.failed;
            stats.failed_chunks += step.stats.failed_chunks;
            if step.stats.failed > 0 {
                stats.degraded_steps += 1;
            }
        }
        stats
    }
}

/// Statistics for an enrichment run
#[derive(Debug, Default, PartialEq)]
pub struct EnrichRunStats {
    pub steps: usize,
    pub rows_matched: usize,
    pub rows_unmatched: usize,
    pub rows_failed: usize,
    pub failed_chunks: usize,
    /// Steps with at least one row left at sentinel by a failure
    pub degraded_steps: usize,
}

impl EnrichRunStats {
    /// Share of steps that completed without failed rows, as a percentage
    pub fn clean_rate(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        (self.steps - self.degraded_steps) as f64 / self.steps as f64 * 100.0
    }
}
