use crate::snapshot::SourceFile;
use crate::store::{RemoteStore, StoreError};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::plan::{BlockPlan, BlockRange};
use crate::sync::types::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub local_len: u64,
    pub remote_size: u64,
    pub blocks_total: u64,
    /// Offsets of local blocks whose remote counterpart differs or is missing
    pub mismatched: Vec<u64>,
    /// Remote bytes past the local length that are not zero page padding
    pub trailing_mismatch: bool,
    /// BLAKE3 of the local file
    pub local_digest: String,
}

impl VerifyReport {
    pub fn is_match(&self) -> bool {
        self.mismatched.is_empty() && !self.trailing_mismatch
    }
}

/// Compares a remote store with a local snapshot using per-block BLAKE3 digests
pub struct SnapshotVerifier {
    block_size: u64,
}

impl Default for SnapshotVerifier {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl SnapshotVerifier {
    pub fn new(block_size: u64) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::InvalidConfig(
                "block size must be greater than zero".into(),
            ));
        }
        Ok(Self { block_size })
    }

    pub async fn verify<R>(&self, remote: &R, local: &Path) -> SyncResult<VerifyReport>
    where
        R: RemoteStore + ?Sized,
    {
        let mut source = SourceFile::open(local).await?;
        let local_len = source.len();

        let remote_size = remote
            .size()
            .await
            .map_err(|source| SyncError::SizeUnavailable { source })?;

        let plan = BlockPlan::new(local_len, self.block_size)?;
        let mut hasher = blake3::Hasher::new();
        let mut mismatched = Vec::new();

        for range in plan.iter() {
            let local_block = source.read_block(range.offset, range.length).await?;
            hasher.update(&local_block);

            if range.end() > remote_size {
                debug!("Block at {} missing remotely", range.offset);
                mismatched.push(range.offset);
                continue;
            }

            let remote_block = read_exact(remote, &range).await?;
            if blake3::hash(&local_block) != blake3::hash(&remote_block) {
                debug!("Block at {} differs", range.offset);
                mismatched.push(range.offset);
            }
        }

        let trailing_mismatch = if remote_size > local_len {
            !self.trailing_is_zero(remote, local_len, remote_size).await?
        } else {
            false
        };

        let report = VerifyReport {
            local_len,
            remote_size,
            blocks_total: plan.block_count(),
            mismatched,
            trailing_mismatch,
            local_digest: hex::encode(hasher.finalize().as_bytes()),
        };

        info!(
            "Verified {} against remote: {} of {} blocks differ{}",
            local.display(),
            report.mismatched.len(),
            report.blocks_total,
            if report.trailing_mismatch {
                ", trailing remote data present"
            } else {
                ""
            }
        );
        Ok(report)
    }

    async fn trailing_is_zero<R>(&self, remote: &R, from: u64, to: u64) -> SyncResult<bool>
    where
        R: RemoteStore + ?Sized,
    {
        let mut offset = from;
        while offset < to {
            let range = BlockRange {
                index: 0,
                offset,
                length: self.block_size.min(to - offset),
            };
            let data = read_exact(remote, &range).await?;
            if data.iter().any(|&b| b != 0) {
                return Ok(false);
            }
            offset = range.end();
        }
        Ok(true)
    }
}

async fn read_exact<R>(remote: &R, range: &BlockRange) -> SyncResult<bytes::Bytes>
where
    R: RemoteStore + ?Sized,
{
    let data = remote
        .read_range(range.offset, range.length)
        .await
        .map_err(|source| SyncError::RemoteReadFailed {
            offset: range.offset,
            length: range.length,
            source,
        })?;

    if data.len() as u64 != range.length {
        return Err(SyncError::RemoteReadFailed {
            offset: range.offset,
            length: range.length,
            source: StoreError::ShortRead {
                offset: range.offset,
                requested: range.length,
                actual: data.len() as u64,
            },
        });
    }
    Ok(data)
}
