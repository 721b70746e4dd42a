//! Structured record backup and restore over the generic `call` primitive

use crate::store::{calls, methods, Record, RemoteStore};
use crate::sync::error::{SyncError, SyncResult};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_RESTORE_BATCH: usize = 100;

/// Fetch every record, page by page, until the host returns a short page
pub async fn backup_records<R>(remote: &R, page_size: u32) -> SyncResult<Vec<Record>>
where
    R: RemoteStore + ?Sized,
{
    if page_size == 0 {
        return Err(SyncError::InvalidConfig(
            "record page size must be greater than zero".into(),
        ));
    }

    let mut records = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = calls::backup_page(remote, offset, page_size)
            .await
            .map_err(|source| SyncError::RemoteCall {
                method: methods::BACKUP.to_string(),
                source,
            })?;

        let count = page.len() as u32;
        debug!("Fetched {} records at offset {}", count, offset);
        records.extend(page);

        if count < page_size {
            break;
        }
        offset += count;
    }

    info!("Backed up {} records", records.len());
    Ok(records)
}

/// Send `records` to the host in batches; returns the number sent
pub async fn restore_records<R>(remote: &R, records: &[Record], batch: usize) -> SyncResult<usize>
where
    R: RemoteStore + ?Sized,
{
    if batch == 0 {
        return Err(SyncError::InvalidConfig(
            "restore batch size must be greater than zero".into(),
        ));
    }

    for chunk in records.chunks(batch) {
        calls::restore(remote, chunk)
            .await
            .map_err(|source| SyncError::RemoteCall {
                method: methods::RESTORE.to_string(),
                source,
            })?;
        debug!("Restored batch of {} records", chunk.len());
    }

    info!("Restored {} records", records.len());
    Ok(records.len())
}

/// Write records as a JSON array of `[key, profile]` pairs
pub async fn write_records_file(path: &Path, records: &[Record]) -> SyncResult<()> {
    let json = serde_json::to_vec_pretty(records).map_err(|e| SyncError::RecordsFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    tokio::fs::write(path, json)
        .await
        .map_err(|source| SyncError::LocalWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn read_records_file(path: &Path) -> SyncResult<Vec<Record>> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|source| SyncError::LocalReadFailed {
            path: path.to_path_buf(),
            offset: 0,
            length: 0,
            source,
        })?;

    serde_json::from_slice(&contents).map_err(|e| SyncError::RecordsFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::store::{InMemoryPages, LocalClient, Profile, StoreService};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(i: u32) -> Record {
        (
            format!("user-{i:04}"),
            Profile {
                updated_time_msecs: Some(1_700_000_000_000 + i as u64),
                username: Some(format!("name{i}")),
                password: None,
                email: Some(format!("user{i}@example.org")),
            },
        )
    }

    fn store() -> LocalClient {
        let owner = Principal::from_token(&[8u8; 32]);
        let service = Arc::new(StoreService::new(InMemoryPages::new()).with_controller(owner));
        LocalClient::new(service, owner)
    }

    #[tokio::test]
    async fn test_backup_spans_pages() {
        let store = store();
        let records: Vec<Record> = (0..25).map(record).collect();
        assert_eq!(restore_records(&store, &records, 7).await.unwrap(), 25);

        // Exact multiple of the page size ends with an empty page
        let backed_up = backup_records(&store, 5).await.unwrap();
        assert_eq!(backed_up, records);

        let backed_up = backup_records(&store, 10).await.unwrap();
        assert_eq!(backed_up.len(), 25);
    }

    #[tokio::test]
    async fn test_records_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let records: Vec<Record> = (0..3).map(record).collect();

        write_records_file(&path, &records).await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0][0], "user-0000");
        assert_eq!(value[0][1]["username"], "name0");

        assert_eq!(read_records_file(&path).await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_malformed_records_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(matches!(
            read_records_file(&path).await,
            Err(SyncError::RecordsFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        assert!(matches!(
            backup_records(&store(), 0).await,
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
