//! Prometheus metrics exporter
//!
//! Serves the recorded metrics over HTTP for scraping.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address of the scrape listener
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

impl MetricsConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self { listen_addr: addr }
    }
}

/// Install the Prometheus recorder and its HTTP listener.
///
/// Only the first call installs anything; later calls return the same handle.
pub fn start_metrics_server(
    config: MetricsConfig,
) -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    // Must run inside a tokio runtime: the listener is bound here
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .build()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!("Metrics exporter stopped: {:?}", e);
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);

    PROMETHEUS_HANDLE.get().ok_or(MetricsError::NotInitialized)
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render the current metrics in the Prometheus text format
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),

    #[error("Metrics recorder not initialized")]
    NotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9090);
    }

    #[test]
    fn test_with_addr() {
        let config = MetricsConfig::with_addr("127.0.0.1:9191".parse().unwrap());
        assert_eq!(config.listen_addr.port(), 9191);
        assert!(render_metrics().is_none() || get_handle().is_some());
    }

    #[tokio::test]
    async fn test_start_on_ephemeral_port() {
        let config = MetricsConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let handle = start_metrics_server(config.clone()).unwrap();

        crate::metrics::recorder::record_block_skipped(4096);
        assert!(handle.render().contains("pagesync_blocks_skipped_total"));

        // Second call hands back the installed recorder
        let again = start_metrics_server(config).unwrap();
        assert!(std::ptr::eq(handle, again));
        assert!(render_metrics().is_some());
    }
}
