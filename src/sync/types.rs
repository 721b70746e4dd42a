use crate::sync::error::{SyncError, SyncResult};
use crate::sync::plan::BlockRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default block size (1 MiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub block_size: u64,

    /// Compare every block but issue no writes
    pub dry_run: bool,

    /// Cap on write payload throughput in bytes/second
    pub bandwidth_limit: Option<u64>,

    /// Copy the source over the reference after a successful push
    pub rotate_reference: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            dry_run: false,
            bandwidth_limit: None,
            rotate_reference: false,
        }
    }
}

impl SyncConfig {
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_bandwidth_limit(mut self, bytes_per_sec: Option<u64>) -> Self {
        self.bandwidth_limit = bytes_per_sec;
        self
    }

    pub fn rotate_reference(mut self, rotate: bool) -> Self {
        self.rotate_reference = rotate;
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.block_size == 0 {
            return Err(SyncError::InvalidConfig(
                "block size must be greater than zero".into(),
            ));
        }
        if usize::try_from(self.block_size).is_err() {
            return Err(SyncError::InvalidConfig(format!(
                "block size {} does not fit in memory",
                self.block_size
            )));
        }
        if self.bandwidth_limit == Some(0) {
            return Err(SyncError::InvalidConfig(
                "bandwidth limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// What happened to a single block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockOutcome {
    /// Equal to the reference
    Skipped,
    Written,
    /// Differs, but the pass is a dry run
    WouldWrite,
}

/// Progress notifications emitted during a push
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started {
        source_len: u64,
        remote_size: u64,
        block_count: u64,
        has_reference: bool,
    },
    Block {
        range: BlockRange,
        outcome: BlockOutcome,
    },
    Finished {
        report: SyncReport,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
}

/// Summary of a completed push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub source_len: u64,
    pub remote_size: u64,
    pub block_size: u64,
    pub blocks_total: u64,
    pub blocks_skipped: u64,
    pub blocks_written: u64,
    pub blocks_would_write: u64,
    pub bytes_written: u64,
    pub reference_used: bool,
    pub dry_run: bool,
    pub rotated: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    pub(crate) fn new(
        source_len: u64,
        remote_size: u64,
        block_size: u64,
        blocks_total: u64,
        reference_used: bool,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_len,
            remote_size,
            block_size,
            blocks_total,
            blocks_skipped: 0,
            blocks_written: 0,
            blocks_would_write: 0,
            bytes_written: 0,
            reference_used,
            dry_run,
            rotated: false,
            started_at,
            elapsed_ms: 0,
        }
    }

    pub(crate) fn record(&mut self, range: &BlockRange, outcome: BlockOutcome) {
        match outcome {
            BlockOutcome::Skipped => self.blocks_skipped += 1,
            BlockOutcome::Written => {
                self.blocks_written += 1;
                self.bytes_written += range.length;
            }
            BlockOutcome::WouldWrite => self.blocks_would_write += 1,
        }
    }

    /// Blocks that differ from the reference, written or not
    pub fn blocks_changed(&self) -> u64 {
        self.blocks_written + self.blocks_would_write
    }

    /// Share of the source that did not need to move
    pub fn skip_ratio(&self) -> f64 {
        if self.blocks_total == 0 {
            return 1.0;
        }
        self.blocks_skipped as f64 / self.blocks_total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.block_size, 1_048_576);
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(SyncConfig::default().with_block_size(0).validate().is_err());
        assert!(SyncConfig::default()
            .with_bandwidth_limit(Some(0))
            .validate()
            .is_err());
        assert!(SyncConfig::default().with_block_size(1).validate().is_ok());
    }

    #[test]
    fn test_report_accounting() {
        let mut report = SyncReport::new(30, 0, 10, 3, true, false, Utc::now());
        let block = |index: u64| BlockRange {
            index,
            offset: index * 10,
            length: 10,
        };

        report.record(&block(0), BlockOutcome::Skipped);
        report.record(&block(1), BlockOutcome::Written);
        report.record(&block(2), BlockOutcome::Skipped);

        assert_eq!(report.blocks_written, 1);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(report.blocks_changed(), 1);
        assert!((report.skip_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }
}
