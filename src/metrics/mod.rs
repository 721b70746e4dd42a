//! Metrics and observability
//!
//! Prometheus-compatible metrics for synchronization passes and the store
//! host:
//! - Blocks skipped, written and read, with byte totals
//! - Pass outcomes and durations per direction
//! - Requests served by the host, store size and open connections

pub mod exporter;
pub mod recorder;

pub use exporter::{start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::{init_metrics, PassMetrics};
