use crate::metrics::recorder::{self, PassMetrics};
use crate::snapshot::rotate::temp_sibling;
use crate::store::{RemoteStore, StoreError};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::plan::BlockPlan;
use crate::sync::types::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub remote_size: u64,
    pub blocks: u64,
    pub bytes_read: u64,
    /// Whether a reference copy was written alongside the snapshot
    pub reference_written: bool,
    pub elapsed_ms: u64,
}

/// Downloads the whole remote store into a local snapshot file.
///
/// Data lands in a temporary file next to the destination and is renamed into
/// place only after every block arrived, so an interrupted pull never leaves a
/// truncated snapshot behind.
pub struct SnapshotPuller {
    block_size: u64,
}

impl Default for SnapshotPuller {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Open temp file plus the path it will be renamed to
struct Staged {
    temp: PathBuf,
    target: PathBuf,
    file: File,
}

impl Staged {
    async fn create(target: &Path) -> SyncResult<Self> {
        let temp = temp_sibling(target);
        let file = File::create(&temp)
            .await
            .map_err(|source| SyncError::LocalWriteFailed {
                path: temp.clone(),
                source,
            })?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
            file,
        })
    }

    async fn write(&mut self, data: &[u8]) -> SyncResult<()> {
        self.file
            .write_all(data)
            .await
            .map_err(|source| SyncError::LocalWriteFailed {
                path: self.temp.clone(),
                source,
            })
    }

    async fn commit(mut self) -> SyncResult<()> {
        let to_error = |path: &Path, source| SyncError::LocalWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        self.file
            .flush()
            .await
            .map_err(|e| to_error(&self.temp, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| to_error(&self.temp, e))?;
        tokio::fs::rename(&self.temp, &self.target)
            .await
            .map_err(|e| to_error(&self.target, e))
    }

    async fn discard(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.temp).await {
            warn!("Could not remove {}: {}", self.temp.display(), e);
        }
    }
}

impl SnapshotPuller {
    pub fn new(block_size: u64) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::InvalidConfig(
                "block size must be greater than zero".into(),
            ));
        }
        Ok(Self { block_size })
    }

    /// Download into `dest`; with `reference`, the same bytes are also written there
    pub async fn pull<R>(
        &self,
        remote: &R,
        dest: &Path,
        reference: Option<&Path>,
    ) -> SyncResult<PullReport>
    where
        R: RemoteStore + ?Sized,
    {
        let start = Instant::now();

        let remote_size = remote
            .size()
            .await
            .map_err(|source| SyncError::SizeUnavailable { source })?;
        let plan = BlockPlan::new(remote_size, self.block_size)?;
        let mut metrics = PassMetrics::start("pull", remote_size);

        let mut snapshot = Staged::create(dest).await?;
        let mut copy = match reference {
            Some(path) => match Staged::create(path).await {
                Ok(staged) => Some(staged),
                Err(e) => {
                    snapshot.discard().await;
                    return Err(e);
                }
            },
            None => None,
        };

        let result = self
            .download(remote, &plan, &mut snapshot, copy.as_mut(), &mut metrics)
            .await;

        let committed = match result {
            Ok(()) => match snapshot.commit().await {
                Ok(()) => match copy {
                    Some(copy) => copy.commit().await,
                    None => Ok(()),
                },
                Err(e) => {
                    if let Some(copy) = copy {
                        copy.discard().await;
                    }
                    Err(e)
                }
            },
            Err(e) => {
                snapshot.discard().await;
                if let Some(copy) = copy {
                    copy.discard().await;
                }
                Err(e)
            }
        };

        if let Err(e) = committed {
            metrics.fail(e.kind());
            return Err(e);
        }
        metrics.complete();

        let report = PullReport {
            remote_size,
            blocks: plan.block_count(),
            bytes_read: remote_size,
            reference_written: reference.is_some(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Pulled {} bytes in {} blocks into {}",
            report.bytes_read,
            report.blocks,
            dest.display()
        );
        Ok(report)
    }

    async fn download<R>(
        &self,
        remote: &R,
        plan: &BlockPlan,
        snapshot: &mut Staged,
        mut copy: Option<&mut Staged>,
        metrics: &mut PassMetrics,
    ) -> SyncResult<()>
    where
        R: RemoteStore + ?Sized,
    {
        for range in plan.iter() {
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

            snapshot.write(&data).await?;
            if let Some(copy) = copy.as_mut() {
                copy.write(&data).await?;
            }

            recorder::record_block_read(range.length);
            metrics.add_bytes(range.length);
            debug!("Pulled block {} [{}, {})", range.index, range.offset, range.end());
        }
        Ok(())
    }
}
