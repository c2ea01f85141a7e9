use tracing::{debug, info};

use crate::app::context::EnrichContext;
use crate::common::constants::{OBJECT_TYPE_FIELD, SIMBAD_SERVICE};
use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogEntry, Coordinate, EnrichmentResult, Radius};

/// Post-filters applied to name and region queries.
#[derive(Debug, Clone, Default)]
pub struct ResolveFilter {
    /// Object types to drop, compared case-insensitively.
    pub exclude_types: Vec<String>,
    pub nearest_only: bool,
}

impl ResolveFilter {
    pub fn excluding<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude_types: types.into_iter().map(Into::into).collect(),
            nearest_only: false,
        }
    }

    pub fn nearest(mut self) -> Self {
        self.nearest_only = true;
        self
    }

    fn rejects(&self, entry: &CatalogEntry) -> bool {
        if self.exclude_types.is_empty() {
            return false;
        }
        let Some(otype) = entry.field(OBJECT_TYPE_FIELD).map(|v| v.to_string()) else {
            return false;
        };
        let otype = otype.trim();
        self.exclude_types.iter().any(|t| t.trim().eq_ignore_ascii_case(otype))
    }

    fn apply(&self, entries: Vec<CatalogEntry>) -> EnrichmentResult {
        let kept: Vec<CatalogEntry> = entries.into_iter().filter(|e| !self.rejects(e)).collect();
        let result = EnrichmentResult::new(kept);
        if self.nearest_only {
            result.into_nearest()
        } else {
            result
        }
    }
}

/// Looks up an object by name in the reference catalog.
///
/// Name matches carry a separation of 0, so nearest-only keeps whichever
/// entry the service returned first.
pub async fn resolve_name(ctx: &EnrichContext, name: &str, filter: &ResolveFilter) -> Result<EnrichmentResult> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EnrichError::invalid("object name is empty"));
    }
    let mut entries = ctx
        .throttled(SIMBAD_SERVICE, ctx.resolver().resolve_name(name))
        .await?;
    for entry in &mut entries {
        entry.separation_arcsec = 0.0;
    }
    debug!(object = name, returned = entries.len(), "name resolved");
    let result = filter.apply(entries);
    info!(object = name, kept = result.len(), "name query finished");
    Ok(result)
}

/// Lists reference-catalog objects within `radius_arcsec` of `center`.
pub async fn resolve_region(
    ctx: &EnrichContext,
    center: Coordinate,
    radius_arcsec: Option<f64>,
    filter: &ResolveFilter,
) -> Result<EnrichmentResult> {
    let radius = Radius::require(radius_arcsec)?;
    let entries = ctx
        .throttled(SIMBAD_SERVICE, ctx.resolver().query_region(center, radius))
        .await?;
    let entries: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|e| radius.contains(e.separation_arcsec))
        .collect();
    let result = filter.apply(entries);
    info!(%center, %radius, kept = result.len(), "region query finished");
    Ok(result)
}
