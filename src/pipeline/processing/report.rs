use serde::Serialize;

use crate::domain::SourceTable;

/// Why a row or chunk did not get a normal result, or why an option was
/// adjusted. None of these abort a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The remote request covering the row failed; cells hold sentinels.
    RemoteFailure,
    /// The row has no coordinate to search around.
    MissingCoordinate,
    /// A requested column is absent from the catalog response, or collides
    /// with a mandatory column.
    SchemaWarning,
    /// Two options were given where one takes precedence.
    OptionConflict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub row: Option<usize>,
    pub chunk: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn row(kind: DiagnosticKind, row: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            row: Some(row),
            chunk: None,
            message: message.into(),
        }
    }

    pub fn chunk_row(kind: DiagnosticKind, chunk: usize, row: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            row: Some(row),
            chunk: Some(chunk),
            message: message.into(),
        }
    }

    pub fn general(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            row: None,
            chunk: None,
            message: message.into(),
        }
    }
}

/// Per-step counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichStats {
    pub rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Rows left at sentinel because their request failed or they had no
    /// coordinate.
    pub failed: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
}

impl EnrichStats {
    /// Match rate as percentage of all rows
    pub fn match_rate(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.matched as f64 / self.rows as f64 * 100.0
    }
}

/// A complete, correctly shaped table plus what went wrong along the way.
#[derive(Debug, Clone)]
pub struct EnrichOutcome {
    pub table: SourceTable,
    pub prefix: String,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: EnrichStats,
}

impl EnrichOutcome {
    /// Rows whose appended cells are sentinels because of a failure, in
    /// ascending order.
    pub fn skipped_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::RemoteFailure | DiagnosticKind::MissingCoordinate))
            .filter_map(|d| d.row)
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    pub fn schema_warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::SchemaWarning)
    }
}
