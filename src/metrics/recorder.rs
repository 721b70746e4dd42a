//! Metrics recorder for synchronization passes and the store host

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    // Block counters
    describe_counter!(
        "pagesync_blocks_skipped_total",
        "Blocks identical to the reference and not transferred"
    );
    describe_counter!(
        "pagesync_blocks_written_total",
        "Blocks written to the remote store"
    );
    describe_counter!(
        "pagesync_blocks_read_total",
        "Blocks read from the remote store"
    );
    describe_counter!("pagesync_bytes_written_total", "Bytes written to the remote store");
    describe_counter!("pagesync_bytes_read_total", "Bytes read from the remote store");

    // Pass counters
    describe_counter!("pagesync_passes_started_total", "Synchronization passes started");
    describe_counter!(
        "pagesync_passes_completed_total",
        "Synchronization passes completed successfully"
    );
    describe_counter!(
        "pagesync_passes_failed_total",
        "Synchronization passes aborted by an error"
    );

    // Host
    describe_counter!(
        "pagesync_requests_served_total",
        "Requests handled by the store host"
    );
    describe_gauge!("pagesync_store_size_bytes", "Current size of the hosted store");
    describe_gauge!("pagesync_active_connections", "Open client connections");

    // Histograms
    describe_histogram!(
        "pagesync_block_write_duration_seconds",
        "Time to write a single block remotely"
    );
    describe_histogram!("pagesync_pass_duration_seconds", "Total pass duration");
    describe_histogram!(
        "pagesync_request_duration_seconds",
        "Time the host spends on one request"
    );
}

// ============== Block Operations ==============

pub fn record_block_skipped(length: u64) {
    counter!("pagesync_blocks_skipped_total").increment(1);
    histogram!("pagesync_skipped_block_bytes").record(length as f64);
}

pub fn record_block_written(length: u64, duration: Duration) {
    counter!("pagesync_blocks_written_total").increment(1);
    counter!("pagesync_bytes_written_total").increment(length);
    histogram!("pagesync_block_write_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_block_read(length: u64) {
    counter!("pagesync_blocks_read_total").increment(1);
    counter!("pagesync_bytes_read_total").increment(length);
}

// ============== Pass Operations ==============

pub fn record_pass_started(direction: &'static str, source_len: u64) {
    counter!("pagesync_passes_started_total", "direction" => direction).increment(1);
    histogram!("pagesync_pass_size_bytes", "direction" => direction).record(source_len as f64);
}

pub fn record_pass_complete(direction: &'static str, duration: Duration, bytes: u64) {
    counter!("pagesync_passes_completed_total", "direction" => direction).increment(1);
    histogram!("pagesync_pass_duration_seconds", "direction" => direction)
        .record(duration.as_secs_f64());

    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        histogram!("pagesync_throughput_bytes_per_second", "direction" => direction)
            .record(bytes as f64 / secs);
    }
}

pub fn record_pass_failed(direction: &'static str, reason: &'static str) {
    counter!("pagesync_passes_failed_total", "direction" => direction, "reason" => reason)
        .increment(1);
}

// ============== Host ==============

/// Record one request handled by the store host
pub fn record_request_served(method: &str, ok: bool, duration: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("pagesync_requests_served_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("pagesync_request_duration_seconds").record(duration.as_secs_f64());
}

pub fn set_store_size(bytes: u64) {
    gauge!("pagesync_store_size_bytes").set(bytes as f64);
}

pub fn set_active_connections(count: usize) {
    gauge!("pagesync_active_connections").set(count as f64);
}

/// Tracks one pass from start to completion or failure
pub struct PassMetrics {
    direction: &'static str,
    start_time: Instant,
    bytes_transferred: u64,
}

impl PassMetrics {
    pub fn start(direction: &'static str, source_len: u64) -> Self {
        record_pass_started(direction, source_len);

        Self {
            direction,
            start_time: Instant::now(),
            bytes_transferred: 0,
        }
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes_transferred += bytes;
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn complete(self) {
        let duration = self.start_time.elapsed();
        record_pass_complete(self.direction, duration, self.bytes_transferred);
    }

    pub fn fail(self, reason: &'static str) {
        record_pass_failed(self.direction, reason);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Current throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.start_time.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Safe to call twice
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_pass_metrics() {
        let mut metrics = PassMetrics::start("push", 1000);
        metrics.add_bytes(400);
        metrics.add_bytes(600);

        assert_eq!(metrics.bytes_transferred(), 1000);
        assert!(metrics.elapsed() >= Duration::ZERO);
        metrics.complete();
    }

    #[test]
    fn test_throughput_calculation() {
        let mut metrics = PassMetrics::start("pull", 1000);
        std::thread::sleep(Duration::from_millis(100));
        metrics.add_bytes(1000);

        let throughput = metrics.throughput();
        assert!(throughput > 1000.0 && throughput < 20000.0);
        metrics.fail("remote_read_failed");
    }
}
