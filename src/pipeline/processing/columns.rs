//! Column policy shared by the enrichment paths: which catalog fields are
//! kept, how they are named in the output table, and how repeated
//! enrichment against one catalog is guarded.

use tracing::warn;

use crate::common::constants::{MATCH_DEC_SUFFIX, MATCH_RA_SUFFIX, SEPARATION_SUFFIX};
use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogDescriptor, CatalogEntry, SourceTable, Value};
use crate::observability::metrics;
use crate::pipeline::processing::report::{Diagnostic, DiagnosticKind};

/// Caller choice of catalog fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    /// Keep only these catalog fields.
    pub allow_list: Option<Vec<String>>,
    /// Use the catalog's fixed default subset; wins over `allow_list`.
    pub use_default_columns: bool,
}

impl ColumnOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_list: Some(names.into_iter().map(Into::into).collect()),
            use_default_columns: false,
        }
    }

    pub fn defaults() -> Self {
        Self {
            allow_list: None,
            use_default_columns: true,
        }
    }

    /// Catalog fields named up front, before any response is seen. `None`
    /// means every returned field.
    pub fn requested(&self, catalog: &CatalogDescriptor) -> Option<Vec<String>> {
        if self.use_default_columns && !catalog.default_columns.is_empty() {
            Some(catalog.default_columns.clone())
        } else {
            self.allow_list.clone()
        }
    }
}

/// What to do when a table already carries columns for the same prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with `InvalidParameter` before any request is made.
    #[default]
    Reject,
    /// Append a numeric suffix to the prefix (`2mass_2`).
    Suffix,
}

/// A prefix is taken when an earlier step used it or when one of the
/// columns this step is known to write already exists. Other columns that
/// merely start with the prefix (`gaia_dr2_id`) do not count.
fn prefix_in_use(table: &SourceTable, prefix: &str, planned: &[String]) -> bool {
    table.applied_prefixes().iter().any(|p| p == prefix)
        || mandatory_suffixes()
            .iter()
            .copied()
            .chain(planned.iter().map(String::as_str))
            .any(|field| table.has_column(&format!("{prefix}_{field}")))
}

/// Picks the column prefix for a new enrichment step. `planned` holds the
/// catalog fields requested up front; fields only discovered in the response
/// are checked again by [`ColumnPlan::drop_taken`].
pub fn claim_prefix(table: &SourceTable, base: &str, planned: &[String], policy: DuplicatePolicy) -> Result<String> {
    if base.is_empty() {
        return Err(EnrichError::invalid("column prefix is empty"));
    }
    if !prefix_in_use(table, base, planned) {
        return Ok(base.to_string());
    }
    match policy {
        DuplicatePolicy::Reject => Err(EnrichError::invalid(format!(
            "table already has columns prefixed '{base}'; pass a different alias or allow repeats"
        ))),
        DuplicatePolicy::Suffix => Ok((2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !prefix_in_use(table, candidate, planned))
            .unwrap_or_else(|| base.to_string())),
    }
}

/// Resolved output columns for one enrichment step.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub prefix: String,
    /// Catalog fields copied into the table, in output order.
    pub fields: Vec<String>,
}

impl ColumnPlan {
    /// Builds the plan from the caller options and the schema the service
    /// returned (`None` when no request succeeded, in which case requested
    /// names are kept without checking them).
    pub fn resolve(
        catalog: &CatalogDescriptor,
        prefix: &str,
        options: &ColumnOptions,
        observed: Option<&[String]>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Self {
        if options.use_default_columns {
            if catalog.default_columns.is_empty() {
                diagnostics.push(Diagnostic::general(
                    DiagnosticKind::OptionConflict,
                    format!("catalog {} has no default column set", catalog.id),
                ));
            } else if options.allow_list.is_some() {
                diagnostics.push(Diagnostic::general(
                    DiagnosticKind::OptionConflict,
                    format!("default columns of {} used; explicit column list ignored", catalog.id),
                ));
            }
        }
        let requested = options.requested(catalog);

        let candidates: Vec<String> = match (&requested, observed) {
            (Some(names), Some(schema)) => names
                .iter()
                .filter(|name| {
                    let present = schema.iter().any(|s| s == *name);
                    if !present {
                        schema_warning(
                            diagnostics,
                            format!("column '{name}' is not in the {} response; omitted", catalog.id),
                        );
                    }
                    present
                })
                .cloned()
                .collect(),
            (Some(names), None) => names.clone(),
            (None, Some(schema)) => schema.to_vec(),
            (None, None) => Vec::new(),
        };

        let mandatory = mandatory_suffixes();
        let mut fields = Vec::with_capacity(candidates.len());
        for name in candidates {
            if mandatory.contains(&name.as_str()) {
                schema_warning(
                    diagnostics,
                    format!("column '{name}' collides with a mandatory {prefix}_{name} column; omitted"),
                );
                continue;
            }
            if !fields.contains(&name) {
                fields.push(name);
            }
        }

        Self {
            prefix: prefix.to_string(),
            fields,
        }
    }

    /// Drops fields whose output column the table already has, so a merge
    /// never overwrites an existing column.
    pub fn drop_taken(mut self, table: &SourceTable, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let prefix = self.prefix.clone();
        self.fields.retain(|field| {
            let column = format!("{prefix}_{field}");
            if table.has_column(&column) {
                schema_warning(diagnostics, format!("column '{column}' already exists in the table; {field} omitted"));
                return false;
            }
            true
        });
        self
    }

    /// Output column names: separation, match coordinate, then fields.
    pub fn output_names(&self) -> Vec<String> {
        mandatory_suffixes()
            .iter()
            .map(|s| s.to_string())
            .chain(self.fields.iter().cloned())
            .map(|name| format!("{}_{}", self.prefix, name))
            .collect()
    }

    pub fn row_values(&self, entry: &CatalogEntry) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.fields.len() + 3);
        values.push(Value::from(entry.separation_arcsec));
        values.push(Value::from(entry.coordinate.ra_deg()));
        values.push(Value::from(entry.coordinate.dec_deg()));
        for field in &self.fields {
            values.push(entry.field(field).cloned().unwrap_or(Value::Null));
        }
        values
    }

    pub fn sentinel_row(&self) -> Vec<Value> {
        vec![Value::Null; self.fields.len() + 3]
    }
}

fn mandatory_suffixes() -> [&'static str; 3] {
    [SEPARATION_SUFFIX, MATCH_RA_SUFFIX, MATCH_DEC_SUFFIX]
}

fn schema_warning(diagnostics: &mut Vec<Diagnostic>, message: String) {
    warn!("{}", message);
    metrics::xmatch::schema_warning();
    diagnostics.push(Diagnostic::general(DiagnosticKind::SchemaWarning, message));
}

/// Merges one optional entry per row into a copy of `table`.
pub fn merge_matches(
    table: &SourceTable,
    plan: &ColumnPlan,
    matches: &[Option<CatalogEntry>],
) -> Result<SourceTable> {
    let values = matches
        .iter()
        .map(|m| match m {
            Some(entry) => plan.row_values(entry),
            None => plan.sentinel_row(),
        })
        .collect();
    let mut merged = table.clone();
    merged.append_columns(&plan.prefix, &plan.output_names(), values)?;
    Ok(merged)
}
