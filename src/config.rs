use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::context::BatchSettings;
use crate::app::enrich_use_case::{EnrichStep, StepMethod};
use crate::common::constants::DEFAULT_DESIGNATION_PREFIX;
use crate::common::error::{EnrichError, Result};
use crate::domain::CatalogDescriptor;
use crate::infra::table_io::TableLayout;
use crate::pipeline::ingestion::rate_limiter::Limits;
use crate::pipeline::processing::columns::{ColumnOptions, DuplicatePolicy};
use crate::pipeline::processing::xmatch::EnrichRequest;

pub const DEFAULT_CONFIG_PATH: &str = "enricher.toml";
pub const CONFIG_PATH_ENV: &str = "ENRICHER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub xmatch: XMatchConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub catalogs: Vec<CatalogDescriptor>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_vizier_tap_url() -> String {
    "https://tapvizier.cds.unistra.fr/TAPVizieR/tap".to_string()
}

fn default_xmatch_url() -> String {
    "https://cdsxmatch.u-strasbg.fr/xmatch/api/v1/sync".to_string()
}

fn default_simbad_tap_url() -> String {
    "https://simbad.cds.unistra.fr/simbad/sim-tap".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("catalog-enricher/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_vizier_tap_url")]
    pub vizier_tap_url: String,
    #[serde(default = "default_xmatch_url")]
    pub xmatch_url: String,
    #[serde(default = "default_simbad_tap_url")]
    pub simbad_tap_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vizier_tap_url: default_vizier_tap_url(),
            xmatch_url: default_xmatch_url(),
            simbad_tap_url: default_simbad_tap_url(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_requests_per_minute() -> Option<u64> {
    Some(60)
}

fn default_radius_arcsec() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct XMatchConfig {
    #[serde(flatten)]
    pub batch: BatchSettings,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: Option<u64>,
    /// Outstanding requests at any moment; defaults to the chunk concurrency.
    #[serde(default)]
    pub max_in_flight: Option<u32>,
    #[serde(default = "default_radius_arcsec")]
    pub default_radius_arcsec: f64,
}

impl Default for XMatchConfig {
    fn default() -> Self {
        Self {
            batch: BatchSettings::default(),
            requests_per_minute: default_requests_per_minute(),
            max_in_flight: None,
            default_radius_arcsec: default_radius_arcsec(),
        }
    }
}

impl XMatchConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            requests_per_min: self.requests_per_minute.filter(|n| *n > 0),
            concurrency: Some(
                self.max_in_flight
                    .unwrap_or(self.batch.max_concurrency.max(1) as u32),
            ),
        }
    }
}

fn default_designation_prefix() -> String {
    DEFAULT_DESIGNATION_PREFIX.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(flatten)]
    pub layout: TableLayout,
    #[serde(default = "default_designation_prefix")]
    pub designation_prefix: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            layout: TableLayout::default(),
            designation_prefix: default_designation_prefix(),
        }
    }
}

/// One `[[steps]]` entry of the multi-catalog run
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub catalog: String,
    #[serde(default)]
    pub radius_arcsec: Option<f64>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub default_columns: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub allow_repeat: bool,
    #[serde(default)]
    pub method: StepMethod,
}

impl StepConfig {
    pub fn to_step(&self, default_radius_arcsec: f64) -> EnrichStep {
        let request = EnrichRequest {
            catalog: self.catalog.clone(),
            radius_arcsec: Some(self.radius_arcsec.unwrap_or(default_radius_arcsec)),
            columns: ColumnOptions {
                allow_list: self.columns.clone(),
                use_default_columns: self.default_columns,
            },
            alias: self.alias.clone(),
            duplicates: if self.allow_repeat {
                DuplicatePolicy::Suffix
            } else {
                DuplicatePolicy::Reject
            },
        };
        EnrichStep {
            request,
            method: self.method,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, else `$ENRICHER_CONFIG`, else
    /// `enricher.toml` when present, else defaults. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            EnrichError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ENRICHER_VIZIER_TAP_URL") {
            self.services.vizier_tap_url = url;
        }
        if let Ok(url) = std::env::var("ENRICHER_XMATCH_URL") {
            self.services.xmatch_url = url;
        }
        if let Ok(url) = std::env::var("ENRICHER_SIMBAD_TAP_URL") {
            self.services.simbad_tap_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.xmatch.batch.batch_size == 0 {
            return Err(EnrichError::Config("xmatch.batch_size must be at least 1".to_string()));
        }
        if !(self.xmatch.default_radius_arcsec.is_finite() && self.xmatch.default_radius_arcsec > 0.0) {
            return Err(EnrichError::Config(
                "xmatch.default_radius_arcsec must be a positive number".to_string(),
            ));
        }
        if let Some(step) = self.steps.iter().find(|s| s.catalog.trim().is_empty()) {
            return Err(EnrichError::Config(format!("step with alias {:?} names no catalog", step.alias)));
        }
        Ok(())
    }

    pub fn enrich_steps(&self) -> Vec<EnrichStep> {
        self.steps
            .iter()
            .map(|s| s.to_step(self.xmatch.default_radius_arcsec))
            .collect()
    }
}
