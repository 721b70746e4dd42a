//! End-to-end push, pull and verify passes against in-process and QUIC stores

mod common;

use bytes::Bytes;
use common::{init_crypto, random_bytes, write_file, RecordingStore, MIB};
use pagesync::auth::Identity;
use pagesync::network::{ConnectionConfig, QuicStoreClient, StoreServer};
use pagesync::store::{FilePages, InMemoryPages, LocalClient, Profile, RemoteStore, StoreService};
use pagesync::sync::{
    backup_records, restore_records, BlockOutcome, DiffSyncEngine, SnapshotPuller,
    SnapshotVerifier, SyncConfig, SyncError, SyncEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

fn engine(block_size: u64) -> DiffSyncEngine {
    DiffSyncEngine::new(SyncConfig::default().with_block_size(block_size)).unwrap()
}

#[tokio::test]
async fn test_empty_source_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "empty.bin", &[]);
    let store = RecordingStore::new();

    let report = engine(MIB).sync(&store, &source, None).await.unwrap();

    assert_eq!(report.blocks_total, 0);
    assert_eq!(report.bytes_written, 0);
    assert!(store.writes().is_empty());
    assert_eq!(store.size_calls(), 1);
}

#[tokio::test]
async fn test_no_reference_writes_everything() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(500_000, 1);
    let source = write_file(dir.path(), "snap.bin", &data);
    let store = RecordingStore::new();

    let report = engine(MIB).sync(&store, &source, None).await.unwrap();

    assert_eq!(store.writes(), vec![(0, 500_000)]);
    assert_eq!(report.blocks_written, 1);
    assert!(!report.reference_used);
    assert_eq!(&store.read_range(0, 500_000).await.unwrap()[..], &data[..]);
}

#[tokio::test]
async fn test_single_changed_byte_writes_one_block() {
    let dir = TempDir::new().unwrap();
    let old = random_bytes(2 * MIB as usize, 2);
    let mut new = old.clone();
    new[1_500_000] ^= 0xff;

    let reference = write_file(dir.path(), "old.bin", &old);
    let source = write_file(dir.path(), "new.bin", &new);
    let store = RecordingStore::new();

    let report = engine(MIB)
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();

    assert_eq!(store.writes(), vec![(MIB, MIB)]);
    assert_eq!(report.blocks_skipped, 1);
    assert_eq!(report.blocks_written, 1);
    assert_eq!(report.bytes_written, MIB);
    assert!(report.reference_used);
}

#[tokio::test]
async fn test_truncated_reference_fails_before_any_write() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(2 * MIB as usize, 3);
    let source = write_file(dir.path(), "new.bin", &data);
    let reference = write_file(dir.path(), "short.bin", &data[..1_000_000]);
    let store = RecordingStore::new();

    let err = engine(MIB)
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap_err();

    match err {
        SyncError::ReferenceInconsistent {
            offset,
            length,
            reference_len,
            ..
        } => {
            assert_eq!(offset, 0);
            assert_eq!(length, MIB);
            assert_eq!(reference_len, 1_000_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_truncated_reference_fails_mid_pass() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(2 * MIB as usize, 4);
    let source = write_file(dir.path(), "new.bin", &data);
    let reference = write_file(dir.path(), "short.bin", &data[..1_000_000]);
    let store = RecordingStore::new();

    let err = engine(500_000)
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::ReferenceInconsistent {
            offset: 1_000_000,
            ..
        }
    ));
    assert!(err.is_integrity_error());
    // Both leading blocks matched the reference, nothing was sent
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_blocks_cover_source_in_order() {
    let cases = [
        (0u64, 7u64),
        (1, 1),
        (999, 1000),
        (1000, 1000),
        (1001, 1000),
        (65_536, 4096),
        (300_001, 65_536),
    ];

    for (len, block_size) in cases {
        let dir = TempDir::new().unwrap();
        let source = write_file(dir.path(), "snap.bin", &random_bytes(len as usize, len));
        let store = RecordingStore::new();

        engine(block_size).sync(&store, &source, None).await.unwrap();

        let writes = store.writes();
        let mut next = 0;
        for (offset, length) in &writes {
            assert_eq!(*offset, next, "gap or overlap for N={len} B={block_size}");
            assert!(*length > 0 && *length <= block_size);
            next = offset + length;
        }
        assert_eq!(next, len);
        assert_eq!(writes.len() as u64, len.div_ceil(block_size));
    }
}

#[tokio::test]
async fn test_skipped_blocks_already_match_remote() {
    let dir = TempDir::new().unwrap();
    let old = random_bytes(64 * 1024, 5);
    let mut new = old.clone();
    new[10] = new[10].wrapping_add(1);
    new[40_000] = new[40_000].wrapping_add(1);

    let reference = write_file(dir.path(), "old.bin", &old);
    let source = write_file(dir.path(), "new.bin", &new);
    let store = RecordingStore::new();
    store.write_range(0, Bytes::from(old)).await.unwrap();

    let report = engine(4096)
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();

    assert_eq!(report.blocks_written, 2);
    assert_eq!(report.blocks_skipped, 14);
    assert_eq!(
        &store.read_range(0, new.len() as u64).await.unwrap()[..],
        &new[..]
    );
}

#[tokio::test]
async fn test_rotation_makes_next_pass_idempotent() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "snap.bin", &random_bytes(3 * 4096 + 17, 6));
    let reference = dir.path().join("snap.ref");
    let store = RecordingStore::new();

    let engine = DiffSyncEngine::new(
        SyncConfig::default()
            .with_block_size(4096)
            .rotate_reference(true),
    )
    .unwrap();

    let first = engine
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();
    assert_eq!(first.blocks_written, 4);
    assert!(first.rotated);
    assert_eq!(
        std::fs::read(&reference).unwrap(),
        std::fs::read(&source).unwrap()
    );

    let second = engine
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();
    assert_eq!(second.blocks_written, 0);
    assert_eq!(second.blocks_skipped, 4);
    assert_eq!(store.writes().len(), 4);
}

#[tokio::test]
async fn test_remote_write_failure_stops_pass() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "snap.bin", &random_bytes(5000, 7));
    let store = RecordingStore::new().failing_write_at(2000);

    let err = engine(1000).sync(&store, &source, None).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::RemoteWriteFailed {
            offset: 2000,
            length: 1000,
            ..
        }
    ));
    // No retry and nothing after the failed block
    assert_eq!(store.writes(), vec![(0, 1000), (1000, 1000), (2000, 1000)]);
}

#[tokio::test]
async fn test_size_failure_aborts_before_writes() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "snap.bin", &random_bytes(100, 8));
    let store = RecordingStore::new().failing_size();

    let err = engine(MIB).sync(&store, &source, None).await.unwrap_err();

    assert!(matches!(err, SyncError::SizeUnavailable { .. }));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_missing_source_never_contacts_remote() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new();

    let err = engine(MIB)
        .sync(&store, &dir.path().join("absent.bin"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SourceMissing { .. }));
    assert_eq!(store.size_calls(), 0);
}

#[tokio::test]
async fn test_source_shrinking_mid_pass_fails_local_read() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "snap.bin", &random_bytes(3000, 9));
    let shrink = source.clone();
    let store = RecordingStore::new().on_write(move |offset| {
        if offset == 0 {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&shrink)
                .unwrap();
            file.set_len(1500).unwrap();
        }
    });

    let err = engine(1000).sync(&store, &source, None).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::LocalReadFailed {
            offset: 1000,
            length: 1000,
            ..
        }
    ));
    assert_eq!(store.writes(), vec![(0, 1000)]);
}

#[tokio::test]
async fn test_dry_run_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let old = random_bytes(8192, 10);
    let mut new = old.clone();
    new[5000] ^= 1;
    let reference = write_file(dir.path(), "old.bin", &old);
    let source = write_file(dir.path(), "new.bin", &new);
    let store = RecordingStore::new();

    let engine = DiffSyncEngine::new(
        SyncConfig::default()
            .with_block_size(4096)
            .dry_run(true)
            .rotate_reference(true),
    )
    .unwrap();
    let report = engine
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.blocks_would_write, 1);
    assert_eq!(report.blocks_written, 0);
    assert!(!report.rotated);
    assert!(store.writes().is_empty());
    assert_eq!(std::fs::read(&reference).unwrap(), old);
}

#[tokio::test]
async fn test_event_stream_matches_report() {
    let dir = TempDir::new().unwrap();
    let old = random_bytes(4000, 11);
    let mut new = old.clone();
    new[3500] ^= 1;
    let reference = write_file(dir.path(), "old.bin", &old);
    let source = write_file(dir.path(), "new.bin", &new);
    let store = RecordingStore::new();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = engine(1000).with_events(tx);
    engine
        .sync(&store, &source, Some(&reference))
        .await
        .unwrap();
    drop(engine);

    let mut outcomes = Vec::new();
    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Block { outcome, .. } => outcomes.push(outcome),
            SyncEvent::Finished { report } => finished = Some(report),
            _ => {}
        }
    }

    assert_eq!(
        outcomes,
        vec![
            BlockOutcome::Skipped,
            BlockOutcome::Skipped,
            BlockOutcome::Skipped,
            BlockOutcome::Written
        ]
    );
    assert_eq!(finished.unwrap().blocks_written, 1);
}

#[tokio::test]
async fn test_pull_then_push_single_change() {
    let dir = TempDir::new().unwrap();
    let original = random_bytes(200_000, 12);
    let store = RecordingStore::new();
    store
        .write_range(0, Bytes::from(original.clone()))
        .await
        .unwrap();

    let snapshot = dir.path().join("pulled.bin");
    let reference = dir.path().join("pulled.ref");
    let pulled = SnapshotPuller::new(65_536)
        .unwrap()
        .pull(&store, &snapshot, Some(&reference))
        .await
        .unwrap();
    assert!(pulled.reference_written);
    assert_eq!(pulled.bytes_read, store.size().await.unwrap());

    let mut local = std::fs::read(&snapshot).unwrap();
    assert_eq!(&local[..original.len()], &original[..]);
    local[70_000] ^= 0x55;
    std::fs::write(&snapshot, &local).unwrap();

    let writes_before = store.writes().len();
    let report = engine(65_536)
        .sync(&store, &snapshot, Some(&reference))
        .await
        .unwrap();
    assert_eq!(report.blocks_written, 1);
    assert_eq!(&store.writes()[writes_before..], &[(65_536, 65_536)]);

    let verified = SnapshotVerifier::new(65_536)
        .unwrap()
        .verify(&store, &snapshot)
        .await
        .unwrap();
    assert!(verified.is_match());
}

#[tokio::test]
async fn test_verify_detects_divergence() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(10_000, 13);
    let store = RecordingStore::new();
    store.write_range(0, Bytes::from(data.clone())).await.unwrap();

    let mut local = data.clone();
    local[9_000] ^= 1;
    let path = write_file(dir.path(), "local.bin", &local);

    let report = SnapshotVerifier::new(4096)
        .unwrap()
        .verify(&store, &path)
        .await
        .unwrap();
    assert!(!report.is_match());
    assert_eq!(report.mismatched, vec![8192]);
    assert!(!report.trailing_mismatch);
}

#[tokio::test]
async fn test_file_store_persists_between_hosts() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.dat");
    let records_path = dir.path().join("store.records.json");
    let identity = Identity::from_secret(b"local host");
    let data = random_bytes(150_000, 14);
    let source = write_file(dir.path(), "snap.bin", &data);

    {
        let service = Arc::new(
            StoreService::new(FilePages::open(&store_path).unwrap())
                .with_controller(identity.principal())
                .with_records_file(&records_path)
                .unwrap(),
        );
        let client = LocalClient::new(service.clone(), identity.principal());
        engine(MIB).sync(&client, &source, None).await.unwrap();

        let records = vec![(
            "alice".to_string(),
            Profile {
                updated_time_msecs: Some(1),
                username: Some("alice".into()),
                password: None,
                email: None,
            },
        )];
        restore_records(&client, &records, 10).await.unwrap();
        service.flush().unwrap();
    }

    let service = Arc::new(
        StoreService::new(FilePages::open(&store_path).unwrap())
            .with_controller(identity.principal())
            .with_records_file(&records_path)
            .unwrap(),
    );
    let client = LocalClient::new(service, identity.principal());

    let report = SnapshotVerifier::new(MIB)
        .unwrap()
        .verify(&client, &source)
        .await
        .unwrap();
    assert!(report.is_match());
    assert_eq!(report.remote_size, 3 * 65_536);

    let records = backup_records(&client, 100).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "alice");
}

#[tokio::test]
async fn test_push_over_quic() {
    init_crypto();
    let dir = TempDir::new().unwrap();
    let identity = Identity::from_secret(b"quic integration");
    let service = Arc::new(
        StoreService::new(InMemoryPages::new()).with_controller(identity.principal()),
    );

    let server = StoreServer::bind(
        ConnectionConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        },
        service.clone(),
    )
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server
            .serve(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let client = QuicStoreClient::connect(
        addr,
        &identity,
        ConnectionConfig {
            insecure_skip_verify: true,
            max_retry_elapsed: Duration::from_secs(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let old = random_bytes(300_000, 15);
    let mut new = old.clone();
    new[299_999] ^= 1;
    let reference = write_file(dir.path(), "old.bin", &old);
    let source = write_file(dir.path(), "new.bin", &new);

    let first = engine(100_000).sync(&client, &reference, None).await.unwrap();
    assert_eq!(first.blocks_written, 3);

    let second = engine(100_000)
        .sync(&client, &source, Some(&reference))
        .await
        .unwrap();
    assert_eq!(second.blocks_written, 1);
    assert_eq!(second.blocks_skipped, 2);

    let verified = SnapshotVerifier::new(100_000)
        .unwrap()
        .verify(&client, &source)
        .await
        .unwrap();
    assert!(verified.is_match());
    assert_eq!(&service.read(299_990, 10).unwrap()[..], &new[299_990..]);

    client.close();
    let _ = shutdown_tx.send(());
    server_task.await.unwrap().unwrap();
}
