use crate::metrics::recorder::{self, PassMetrics};
use crate::network::WriteThrottle;
use crate::snapshot::{rotate_reference, ReferenceSnapshot, SourceFile};
use crate::store::RemoteStore;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::plan::BlockPlan;
use crate::sync::state::{PassEvent, PassStateMachine};
use crate::sync::types::{BlockOutcome, SyncConfig, SyncEvent, SyncReport};
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pushes a local snapshot to a remote store, writing only the blocks that
/// differ from an optional reference snapshot.
///
/// A pass walks the source in fixed-size blocks in increasing offset order.
/// Each block is compared byte for byte against the same range of the
/// reference; equal blocks are skipped, all others are written and
/// acknowledged before the next block is read. The first failure aborts the
/// pass. Retrying is left to the remote client.
pub struct DiffSyncEngine {
    config: SyncConfig,
    throttle: WriteThrottle,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl DiffSyncEngine {
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let throttle = WriteThrottle::from_limit(config.bandwidth_limit);

        Ok(Self {
            config,
            throttle,
            events: None,
        })
    }

    /// Stream progress events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn sync<R>(
        &self,
        remote: &R,
        source: &Path,
        reference: Option<&Path>,
    ) -> SyncResult<SyncReport>
    where
        R: RemoteStore + ?Sized,
    {
        if self.config.rotate_reference && reference.is_none() {
            return Err(SyncError::InvalidConfig(
                "reference rotation requires a reference path".into(),
            ));
        }

        let mut source_file = SourceFile::open(source).await?;
        let mut reference_file = match reference {
            Some(path) => ReferenceSnapshot::open(path).await?,
            None => None,
        };

        let mut machine = PassStateMachine::new(source_file.len());
        let mut metrics = PassMetrics::start("push", source_file.len());

        let outcome = self
            .run(
                remote,
                &mut source_file,
                reference_file.as_mut(),
                &mut machine,
                &mut metrics,
            )
            .await;

        let mut report = match outcome {
            Ok(report) => report,
            Err(e) => {
                if let Err(state_err) = machine.transition(PassEvent::Abort {
                    error: e.to_string(),
                }) {
                    debug!("Abort not recorded in pass state: {}", state_err);
                }
                warn!("Push of {} aborted: {}", source.display(), e);
                metrics.fail(e.kind());
                self.emit(SyncEvent::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        metrics.complete();

        // Release the baseline before it is replaced
        drop(reference_file);

        if let Some(reference) = reference.filter(|_| self.config.rotate_reference) {
            if self.config.dry_run {
                debug!("Dry run, leaving reference {} in place", reference.display());
            } else {
                rotate_reference(source, reference).await?;
                report.rotated = true;
            }
        }

        info!(
            "Pushed {}: {} blocks, {} written, {} skipped, {} would write ({} bytes) in {}ms",
            source.display(),
            report.blocks_total,
            report.blocks_written,
            report.blocks_skipped,
            report.blocks_would_write,
            report.bytes_written,
            report.elapsed_ms
        );
        self.emit(SyncEvent::Finished {
            report: report.clone(),
        });

        Ok(report)
    }

    async fn run<R>(
        &self,
        remote: &R,
        source: &mut SourceFile,
        mut reference: Option<&mut ReferenceSnapshot>,
        machine: &mut PassStateMachine,
        metrics: &mut PassMetrics,
    ) -> SyncResult<SyncReport>
    where
        R: RemoteStore + ?Sized,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let source_len = source.len();

        let remote_size = remote
            .size()
            .await
            .map_err(|source| SyncError::SizeUnavailable { source })?;
        machine.transition(PassEvent::SizeQueried { remote_size })?;

        if remote_size > source_len {
            info!(
                "Remote store holds {} bytes, source {}; trailing bytes left untouched",
                remote_size, source_len
            );
        }

        let plan = BlockPlan::new(source_len, self.config.block_size)?;
        let mut report = SyncReport::new(
            source_len,
            remote_size,
            plan.block_size(),
            plan.block_count(),
            reference.is_some(),
            self.config.dry_run,
            started_at,
        );

        debug!(
            "Pass over {} bytes in {} blocks of {} (reference: {})",
            source_len,
            plan.block_count(),
            plan.block_size(),
            reference.is_some()
        );
        self.emit(SyncEvent::Started {
            source_len,
            remote_size,
            block_count: plan.block_count(),
            has_reference: reference.is_some(),
        });

        machine.transition(PassEvent::ScanStarted)?;

        for range in plan.iter() {
            let block = source.read_block(range.offset, range.length).await?;
            machine.transition(PassEvent::BlockLoaded(range))?;

            let unchanged = match reference.as_mut() {
                Some(reference) => reference.read_block(range.offset, range.length).await? == block,
                None => false,
            };

            let outcome = if unchanged {
                recorder::record_block_skipped(range.length);
                machine.transition(PassEvent::BlockSkipped)?;
                BlockOutcome::Skipped
            } else if self.config.dry_run {
                machine.transition(PassEvent::BlockSkipped)?;
                BlockOutcome::WouldWrite
            } else {
                self.throttle.wait_for_bytes(range.length).await;

                let write_start = Instant::now();
                remote
                    .write_range(range.offset, Bytes::from(block))
                    .await
                    .map_err(|source| SyncError::RemoteWriteFailed {
                        offset: range.offset,
                        length: range.length,
                        source,
                    })?;
                recorder::record_block_written(range.length, write_start.elapsed());
                metrics.add_bytes(range.length);

                machine.transition(PassEvent::BlockWritten)?;
                BlockOutcome::Written
            };

            debug!(
                "Block {} [{}, {}) {:?}",
                range.index,
                range.offset,
                range.end(),
                outcome
            );
            report.record(&range, outcome);
            self.emit(SyncEvent::Block { range, outcome });
        }

        machine.transition(PassEvent::Finished)?;
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(report)
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::store::{InMemoryPages, LocalClient, StoreService};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn local_store() -> LocalClient {
        let owner = Principal::from_token(&[3u8; 32]);
        let service = Arc::new(StoreService::new(InMemoryPages::new()).with_controller(owner));
        LocalClient::new(service, owner)
    }

    #[tokio::test]
    async fn test_rotate_without_reference_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("s.dat");
        tokio::fs::write(&source, b"abc").await.unwrap();

        let engine = DiffSyncEngine::new(SyncConfig::default().rotate_reference(true)).unwrap();
        let result = engine.sync(&local_store(), &source, None).await;
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_zero_block_size_rejected() {
        assert!(matches!(
            DiffSyncEngine::new(SyncConfig::default().with_block_size(0)),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_events_cover_every_block() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("s.dat");
        tokio::fs::write(&source, vec![5u8; 2500]).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = DiffSyncEngine::new(SyncConfig::default().with_block_size(1000))
            .unwrap()
            .with_events(tx);

        let report = engine.sync(&local_store(), &source, None).await.unwrap();
        assert_eq!(report.blocks_written, 3);

        let mut blocks = Vec::new();
        let mut finished = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::Block { range, outcome } => {
                    assert_eq!(outcome, BlockOutcome::Written);
                    blocks.push((range.offset, range.length));
                }
                SyncEvent::Finished { .. } => finished = true,
                _ => {}
            }
        }
        assert_eq!(blocks, vec![(0, 1000), (1000, 1000), (2000, 500)]);
        assert!(finished);
    }

    #[tokio::test]
    async fn test_empty_source_makes_no_writes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty.dat");
        tokio::fs::write(&source, b"").await.unwrap();

        let store = local_store();
        let engine = DiffSyncEngine::new(SyncConfig::default()).unwrap();
        let report = engine.sync(&store, &source, None).await.unwrap();

        assert_eq!(report.blocks_total, 0);
        assert_eq!(report.bytes_written, 0);
        assert_eq!(store.size().await.unwrap(), 0);
    }
}
