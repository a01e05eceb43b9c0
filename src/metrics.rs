//! Prometheus metrics for the gateway.
//!
//! Counters are registered once against a shared registry and treated as
//! write-only sinks by the pipeline and the inbound poller.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Gateway counters, shared across workers.
///
/// All metrics use interior mutability and are safe to share across threads.
#[derive(Clone)]
pub struct GatewayMetrics {
    /// Files downloaded from the ODFI's server, labeled by direction kind
    /// (inbound, reconciliation, return).
    files_downloaded: CounterVec,

    /// Merged files written to the remote agent, labeled by shard.
    files_uploaded: CounterVec,

    /// Cutoffs that surfaced an error list, labeled by shard.
    merge_errors: CounterVec,
}

impl GatewayMetrics {
    /// Creates gateway metrics and registers them with the given registry.
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let files_downloaded = CounterVec::new(
            Opts::new(
                "files_downloaded",
                "Counter of files downloaded from a remote server",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(files_downloaded.clone()))?;

        let files_uploaded = CounterVec::new(
            Opts::new(
                "files_uploaded",
                "Counter of merged files uploaded to a remote server",
            ),
            &["shard"],
        )?;
        registry.register(Box::new(files_uploaded.clone()))?;

        let merge_errors = CounterVec::new(
            Opts::new("merge_errors", "Counter of cutoffs that returned errors"),
            &["shard"],
        )?;
        registry.register(Box::new(merge_errors.clone()))?;

        Ok(Self {
            files_downloaded,
            files_uploaded,
            merge_errors,
        })
    }

    pub fn files_downloaded(&self, kind: &str, count: u64) {
        self.files_downloaded
            .with_label_values(&[kind])
            .inc_by(count as f64);
    }

    pub fn file_uploaded(&self, shard: &str) {
        self.files_uploaded.with_label_values(&[shard]).inc();
    }

    pub fn merge_error(&self, shard: &str) {
        self.merge_errors.with_label_values(&[shard]).inc();
    }

    /// Export all registered metrics in Prometheus text format.
    pub fn export(registry: &Registry) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&registry.gather(), &mut buf)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
