//! Simple metrics module for the catalog enricher
//!
//! Records through the `metrics` facade using Prometheus naming conventions.
//! Nothing is exported unless a recorder is installed (see [`install_prometheus`]).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Remote service metrics
    RemoteRequestsSuccess,
    RemoteRequestsError,
    RemoteRequestDuration,
    RemoteRetries,

    // Cross-match metrics
    XMatchChunksSubmitted,
    XMatchChunksFailed,
    XMatchRowsMatched,
    XMatchRowsUnmatched,
    XMatchRowsFailed,

    // Table preparation metrics
    PrepareCoordinatesResolved,
    PrepareDesignationsGenerated,

    // Schema warnings
    SchemaWarnings,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RemoteRequestsSuccess => "enricher_remote_requests_success_total",
            MetricName::RemoteRequestsError => "enricher_remote_requests_error_total",
            MetricName::RemoteRequestDuration => "enricher_remote_request_duration_seconds",
            MetricName::RemoteRetries => "enricher_remote_retries_total",

            MetricName::XMatchChunksSubmitted => "enricher_xmatch_chunks_submitted_total",
            MetricName::XMatchChunksFailed => "enricher_xmatch_chunks_failed_total",
            MetricName::XMatchRowsMatched => "enricher_xmatch_rows_matched_total",
            MetricName::XMatchRowsUnmatched => "enricher_xmatch_rows_unmatched_total",
            MetricName::XMatchRowsFailed => "enricher_xmatch_rows_failed_total",

            MetricName::PrepareCoordinatesResolved => "enricher_prepare_coordinates_resolved_total",
            MetricName::PrepareDesignationsGenerated => "enricher_prepare_designations_generated_total",

            MetricName::SchemaWarnings => "enricher_schema_warnings_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install a Prometheus recorder serving `/metrics` on `addr`.
pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter on {}: {}", addr, e))
}

pub mod remote {
    use super::*;

    /// Record the outcome and latency of one remote service call
    pub fn request_completed(service: &'static str, success: bool, elapsed: Duration) {
        let name = if success {
            MetricName::RemoteRequestsSuccess
        } else {
            MetricName::RemoteRequestsError
        };
        ::metrics::counter!(name.as_str(), "service" => service).increment(1);
        ::metrics::histogram!(MetricName::RemoteRequestDuration.as_str(), "service" => service)
            .record(elapsed.as_secs_f64());
    }

    pub fn retried(service: &'static str) {
        ::metrics::counter!(MetricName::RemoteRetries.as_str(), "service" => service).increment(1);
    }
}

pub mod xmatch {
    use super::*;

    pub fn chunk_submitted(catalog: &str) {
        ::metrics::counter!(MetricName::XMatchChunksSubmitted.as_str(), "catalog" => catalog.to_string()).increment(1);
    }

    pub fn chunk_failed(catalog: &str) {
        ::metrics::counter!(MetricName::XMatchChunksFailed.as_str(), "catalog" => catalog.to_string()).increment(1);
    }

    /// Record the per-row outcome counts of one enrichment step
    pub fn rows_recorded(catalog: &str, matched: usize, unmatched: usize, failed: usize) {
        let catalog = catalog.to_string();
        ::metrics::counter!(MetricName::XMatchRowsMatched.as_str(), "catalog" => catalog.clone()).increment(matched as u64);
        ::metrics::counter!(MetricName::XMatchRowsUnmatched.as_str(), "catalog" => catalog.clone()).increment(unmatched as u64);
        ::metrics::counter!(MetricName::XMatchRowsFailed.as_str(), "catalog" => catalog).increment(failed as u64);
    }

    pub fn schema_warning() {
        ::metrics::counter!(MetricName::SchemaWarnings.as_str()).increment(1);
    }
}

pub mod prepare {
    use super::*;

    pub fn coordinates_resolved(count: usize) {
        ::metrics::counter!(MetricName::PrepareCoordinatesResolved.as_str()).increment(count as u64);
    }

    pub fn designations_generated(count: usize) {
        ::metrics::counter!(MetricName::PrepareDesignationsGenerated.as_str()).increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prometheus_style() {
        for name in [
            MetricName::RemoteRequestsSuccess,
            MetricName::XMatchChunksFailed,
            MetricName::PrepareDesignationsGenerated,
        ] {
            assert!(name.as_str().starts_with("enricher_"));
            assert!(name.as_str().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
