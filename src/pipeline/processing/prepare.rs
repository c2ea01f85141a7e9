use tracing::{debug, info};

use crate::common::constants::DEFAULT_DESIGNATION_PREFIX;
use crate::common::error::{EnrichError, Result};
use crate::domain::sky::{format_designation, parse_designation};
use crate::domain::{SourceRecord, SourceTable};
use crate::observability::metrics;

/// Options for table preparation
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Text placed before generated designations, e.g. `J` or `2MASS J`.
    pub designation_prefix: String,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            designation_prefix: DEFAULT_DESIGNATION_PREFIX.to_string(),
        }
    }
}

/// Which half of a record preparation had to fill in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareAction {
    Unchanged,
    ResolvedCoordinate,
    GeneratedDesignation,
}

/// Completes one record so it carries both a designation and a coordinate.
pub fn prepare_record(record: &mut SourceRecord, options: &PrepareOptions) -> Result<PrepareAction> {
    match (record.designation.as_deref(), record.coordinate) {
        (Some(_), Some(_)) => Ok(PrepareAction::Unchanged),
        (Some(designation), None) => {
            let coordinate = parse_designation(designation)?;
            record.coordinate = Some(coordinate);
            Ok(PrepareAction::ResolvedCoordinate)
        }
        (None, Some(coordinate)) => {
            record.designation = Some(format_designation(&coordinate, &options.designation_prefix));
            Ok(PrepareAction::GeneratedDesignation)
        }
        (None, None) => Err(EnrichError::invalid(
            "record has neither a designation nor a coordinate",
        )),
    }
}

/// Returns a copy of `table` in which every row has both a designation and a
/// coordinate. Row order and extension columns are untouched.
///
/// Fails on the first row whose designation cannot be decoded (`Parse`) or
/// that carries neither field (`InvalidParameter`); the error names the row.
pub fn prepare_table(table: &SourceTable, options: &PrepareOptions) -> Result<SourceTable> {
    let mut prepared = table.clone();
    let mut resolved = 0;
    let mut generated = 0;

    for (index, record) in prepared.rows_mut().iter_mut().enumerate() {
        let action = prepare_record(record, options).map_err(|e| match e {
            EnrichError::Parse(msg) => EnrichError::Parse(format!("row {index}: {msg}")),
            EnrichError::InvalidParameter(msg) => EnrichError::InvalidParameter(format!("row {index}: {msg}")),
            other => other,
        })?;
        match action {
            PrepareAction::ResolvedCoordinate => resolved += 1,
            PrepareAction::GeneratedDesignation => generated += 1,
            PrepareAction::Unchanged => {}
        }
        debug!(row = index, ?action, "prepared row");
    }

    metrics::prepare::coordinates_resolved(resolved);
    metrics::prepare::designations_generated(generated);
    info!(
        rows = prepared.len(),
        resolved, generated, "table prepared"
    );
    Ok(prepared)
}
