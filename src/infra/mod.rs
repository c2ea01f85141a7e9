// Adapters for the ports in `app::ports`, plus table file I/O

pub mod http_client;
pub mod in_memory_catalog;
pub mod simbad;
pub mod table_io;
pub mod tap;
pub mod vizier;

use std::sync::Arc;

use crate::app::context::EnrichContext;
use crate::common::error::Result;
use crate::config::Config;
use crate::domain::CatalogRegistry;
use crate::pipeline::ingestion::rate_limiter::RateLimiter;

pub use in_memory_catalog::{InMemoryCatalog, InMemoryResolver};
pub use simbad::SimbadClient;
pub use vizier::CdsCatalogClient;

/// Wires the CDS adapters, catalog registry and limits described by `config`.
pub fn build_context(config: &Config) -> Result<EnrichContext> {
    let client = http_client::build_client(&config.services.user_agent, config.services.timeout_seconds)?;
    let catalogs = CdsCatalogClient::new(
        client.clone(),
        config.services.vizier_tap_url.clone(),
        config.services.xmatch_url.clone(),
    );
    let resolver = SimbadClient::new(client, config.services.simbad_tap_url.clone());

    Ok(EnrichContext::new(Arc::new(catalogs), Arc::new(resolver))
        .with_registry(CatalogRegistry::builtin().with_catalogs(config.catalogs.iter().cloned()))
        .with_limiter(RateLimiter::new(config.xmatch.limits()))
        .with_settings(config.xmatch.batch.clone()))
}
