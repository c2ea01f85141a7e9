use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::app::ports::{CatalogServicePort, NameResolverPort};
use crate::common::error::Result;
use crate::domain::{CatalogDescriptor, CatalogRegistry};
use crate::observability::metrics;
use crate::pipeline::ingestion::rate_limiter::RateLimiter;

fn default_batch_size() -> usize {
    500
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Batching and retry knobs for remote lookups.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    /// Rows per cross-match request (capped by the service maximum).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Chunks (or single-source lookups) processed at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Extra attempts after a remote failure before a chunk is given up on.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Everything an enrichment call needs, constructed once and reused.
#[derive(Clone)]
pub struct EnrichContext {
    catalogs: Arc<dyn CatalogServicePort>,
    resolver: Arc<dyn NameResolverPort>,
    registry: CatalogRegistry,
    limiter: RateLimiter,
    settings: BatchSettings,
}

impl EnrichContext {
    pub fn new(catalogs: Arc<dyn CatalogServicePort>, resolver: Arc<dyn NameResolverPort>) -> Self {
        Self {
            catalogs,
            resolver,
            registry: CatalogRegistry::builtin(),
            limiter: RateLimiter::unlimited(),
            settings: BatchSettings::default(),
        }
    }

    pub fn with_registry(mut self, registry: CatalogRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_settings(mut self, settings: BatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalogs(&self) -> &Arc<dyn CatalogServicePort> {
        &self.catalogs
    }

    pub fn resolver(&self) -> &Arc<dyn NameResolverPort> {
        &self.resolver
    }

    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn resolve_catalog(&self, identifier: &str) -> Result<CatalogDescriptor> {
        self.registry.resolve(identifier)
    }

    /// Effective chunk size: configured size bounded by the service maximum.
    pub fn chunk_size(&self) -> usize {
        self.settings
            .batch_size
            .clamp(1, self.catalogs.max_batch_size().max(1))
    }

    pub fn concurrency(&self) -> usize {
        self.settings.max_concurrency.max(1)
    }

    /// Runs one remote request under the shared rate limit, recording its
    /// outcome and latency.
    pub async fn throttled<T, F>(&self, service: &'static str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.limiter.acquire().await;
        let started = Instant::now();
        let result = request.await;
        metrics::remote::request_completed(service, result.is_ok(), started.elapsed());
        result
    }

    /// Like [`throttled`](Self::throttled), retrying transient remote failures
    /// up to the configured number of extra attempts. Refusals and other
    /// errors return immediately.
    pub async fn throttled_with_retry<T, F, Fut>(&self, service: &'static str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.throttled(service, request()).await {
                Err(e) if e.is_retryable() && attempt < self.settings.retries => {
                    attempt += 1;
                    metrics::remote::retried(service);
                    tracing::warn!(service, attempt, error = %e, "remote request failed, retrying");
                    let backoff = self.settings.retry_backoff_ms.saturating_mul(attempt as u64);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for EnrichContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichContext")
            .field("catalogs", &self.registry.catalogs().len())
            .field("limits", self.limiter.limits())
            .field("settings", &self.settings)
            .finish()
    }
}
