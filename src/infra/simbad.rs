use async_trait::async_trait;

use crate::app::ports::NameResolverPort;
use crate::common::constants::SIMBAD_SERVICE;
use crate::common::error::Result;
use crate::domain::{CatalogEntry, Coordinate, Radius};
use crate::infra::tap::{quote_literal, run_sync};

const BASIC_COLUMNS: &str = "basic.main_id, basic.ra, basic.dec, basic.otype, basic.sp_type, \
                             basic.plx_value, basic.pmra, basic.pmdec, basic.rvz_redshift";

/// Name and region resolution against the Simbad TAP service
pub struct SimbadClient {
    client: reqwest::Client,
    tap_url: String,
}

impl SimbadClient {
    pub fn new(client: reqwest::Client, tap_url: impl Into<String>) -> Self {
        Self {
            client,
            tap_url: tap_url.into(),
        }
    }
}

pub(crate) fn name_adql(name: &str) -> String {
    format!(
        "SELECT {BASIC_COLUMNS} FROM basic JOIN ident ON ident.oidref = basic.oid WHERE ident.id = {}",
        quote_literal(name)
    )
}

pub(crate) fn region_adql(center: Coordinate, radius: Radius) -> String {
    format!(
        "SELECT {BASIC_COLUMNS} FROM basic WHERE 1 = CONTAINS(POINT('ICRS', basic.ra, basic.dec), CIRCLE('ICRS', {:.8}, {:.8}, {:.10}))",
        center.ra_deg(),
        center.dec_deg(),
        radius.degrees()
    )
}

#[async_trait]
impl NameResolverPort for SimbadClient {
    async fn resolve_name(&self, name: &str) -> Result<Vec<CatalogEntry>> {
        let table = run_sync(&self.client, SIMBAD_SERVICE, &self.tap_url, &name_adql(name)).await?;
        table.into_entries(SIMBAD_SERVICE, "ra", "dec", None)
    }

    async fn query_region(&self, center: Coordinate, radius: Radius) -> Result<Vec<CatalogEntry>> {
        let table = run_sync(&self.client, SIMBAD_SERVICE, &self.tap_url, &region_adql(center, radius)).await?;
        table.into_entries(SIMBAD_SERVICE, "ra", "dec", Some(center))
    }
}
