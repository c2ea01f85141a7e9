use serde::{Deserialize, Serialize};

use crate::common::constants::*;
use crate::common::error::{EnrichError, Result};

fn default_ra_column() -> String {
    J2000_RA_COLUMN.to_string()
}

fn default_dec_column() -> String {
    J2000_DEC_COLUMN.to_string()
}

/// What the engine needs to know about a remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    /// VizieR identifier, e.g. `II/246/out`.
    pub id: String,
    /// Short name used as column prefix and on the command line.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_ra_column")]
    pub ra_column: String,
    #[serde(default = "default_dec_column")]
    pub dec_column: String,
    /// Fixed subset (magnitudes and uncertainties) used when the caller asks
    /// for the default columns.
    #[serde(default)]
    pub default_columns: Vec<String>,
}

impl CatalogDescriptor {
    fn builtin(id: &str, alias: &str, ra: &str, dec: &str, defaults: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            alias: Some(alias.to_string()),
            ra_column: ra.to_string(),
            dec_column: dec.to_string(),
            default_columns: defaults.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Descriptor for a catalog the registry has no entry for.
    pub fn ad_hoc(id: &str) -> Self {
        Self {
            id: id.to_string(),
            alias: None,
            ra_column: default_ra_column(),
            dec_column: default_dec_column(),
            default_columns: Vec::new(),
        }
    }

    /// Column prefix: the alias when set, otherwise the identifier with every
    /// non-alphanumeric character replaced by `_`.
    pub fn prefix(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.trim().is_empty() => sanitize_prefix(alias),
            _ => sanitize_prefix(&self.id),
        }
    }
}

pub fn sanitize_prefix(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn is_vizier_identifier(id: &str) -> bool {
    id.contains('/')
        && !id.starts_with('/')
        && !id.ends_with('/')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '+' | '-'))
}

/// Known catalogs, replacing per-process cached catalog handles.
#[derive(Debug, Clone, Default)]
pub struct CatalogRegistry {
    catalogs: Vec<CatalogDescriptor>,
}

impl CatalogRegistry {
    pub fn builtin() -> Self {
        Self {
            catalogs: vec![
                CatalogDescriptor::builtin(TWOMASS_CATALOG, TWOMASS_ALIAS, J2000_RA_COLUMN, J2000_DEC_COLUMN, TWOMASS_DEFAULT_COLUMNS),
                CatalogDescriptor::builtin(GAIA_DR3_CATALOG, GAIA_DR3_ALIAS, ICRS_RA_COLUMN, ICRS_DEC_COLUMN, GAIA_DR3_DEFAULT_COLUMNS),
                CatalogDescriptor::builtin(ALLWISE_CATALOG, ALLWISE_ALIAS, J2000_RA_COLUMN, J2000_DEC_COLUMN, ALLWISE_DEFAULT_COLUMNS),
                CatalogDescriptor::builtin(SDSS_DR16_CATALOG, SDSS_DR16_ALIAS, ICRS_RA_COLUMN, ICRS_DEC_COLUMN, SDSS_DR16_DEFAULT_COLUMNS),
                CatalogDescriptor::builtin(PANSTARRS_CATALOG, PANSTARRS_ALIAS, J2000_RA_COLUMN, J2000_DEC_COLUMN, PANSTARRS_DEFAULT_COLUMNS),
            ],
        }
    }

    /// Adds or replaces (by identifier) catalog descriptors.
    pub fn with_catalogs(mut self, extra: impl IntoIterator<Item = CatalogDescriptor>) -> Self {
        for descriptor in extra {
            match self.catalogs.iter_mut().find(|c| c.id == descriptor.id) {
                Some(existing) => *existing = descriptor,
                None => self.catalogs.push(descriptor),
            }
        }
        self
    }

    pub fn catalogs(&self) -> &[CatalogDescriptor] {
        &self.catalogs
    }

    /// Looks up a catalog by identifier or alias (case-insensitive).
    ///
    /// Well-formed VizieR identifiers that are not registered resolve to an
    /// ad-hoc descriptor; whether the catalog exists is for the service to say.
    pub fn resolve(&self, identifier: &str) -> Result<CatalogDescriptor> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(EnrichError::invalid("catalog identifier is empty"));
        }
        if let Some(found) = self.catalogs.iter().find(|c| {
            c.id == identifier
                || c.alias
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(identifier))
        }) {
            return Ok(found.clone());
        }
        if is_vizier_identifier(identifier) {
            return Ok(CatalogDescriptor::ad_hoc(identifier));
        }
        Err(EnrichError::invalid(format!(
            "unknown catalog identifier '{identifier}' (known aliases: {})",
            get_supported_catalogs().join(", ")
        )))
    }
}
