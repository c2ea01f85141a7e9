use async_trait::async_trait;

use crate::common::constants::XMATCH_MAX_BATCH_SIZE;
use crate::common::error::Result;
use crate::domain::{CatalogDescriptor, CatalogEntry, Coordinate, Radius};

/// A positional search around one point.
#[derive(Debug, Clone)]
pub struct ConeQuery {
    pub catalog: CatalogDescriptor,
    pub center: Coordinate,
    pub radius: Radius,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogResponse {
    /// Catalog field names in the order the service reported them.
    pub columns: Vec<String>,
    pub entries: Vec<CatalogEntry>,
}

/// A batched positional cross-match; positions carry their input row index.
#[derive(Debug, Clone)]
pub struct BatchQuery {
    pub catalog: CatalogDescriptor,
    pub radius: Radius,
    pub positions: Vec<(usize, Coordinate)>,
}

#[derive(Debug, Clone)]
pub struct BatchMatch {
    /// Input row index echoed back by the service.
    pub row: usize,
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResponse {
    pub columns: Vec<String>,
    /// Matches in service response order; several may share a row.
    pub matches: Vec<BatchMatch>,
}

#[async_trait]
pub trait CatalogServicePort: Send + Sync {
    async fn cone_search(&self, query: &ConeQuery) -> Result<CatalogResponse>;

    async fn cross_match(&self, query: &BatchQuery) -> Result<BatchResponse>;

    /// Largest number of positions one `cross_match` call accepts.
    fn max_batch_size(&self) -> usize {
        XMATCH_MAX_BATCH_SIZE
    }
}

/// Reference catalog used for name and region resolution.
#[async_trait]
pub trait NameResolverPort: Send + Sync {
    async fn resolve_name(&self, name: &str) -> Result<Vec<CatalogEntry>>;

    async fn query_region(&self, center: Coordinate, radius: Radius) -> Result<Vec<CatalogEntry>>;
}
