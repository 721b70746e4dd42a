use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source file not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("Remote size query failed: {source}")]
    SizeUnavailable { source: StoreError },

    #[error("Local read of {} failed at offset {offset} (length {length}): {source}", path.display())]
    LocalReadFailed {
        path: PathBuf,
        offset: u64,
        length: u64,
        source: std::io::Error,
    },

    #[error(
        "Reference snapshot {} is inconsistent: block at offset {offset} (length {length}) \
         extends past its length {reference_len}",
        path.display()
    )]
    ReferenceInconsistent {
        path: PathBuf,
        offset: u64,
        length: u64,
        reference_len: u64,
    },

    #[error("Remote write failed at offset {offset} (length {length}): {source}")]
    RemoteWriteFailed {
        offset: u64,
        length: u64,
        source: StoreError,
    },

    #[error("Remote read failed at offset {offset} (length {length}): {source}")]
    RemoteReadFailed {
        offset: u64,
        length: u64,
        source: StoreError,
    },

    #[error("Local write of {} failed: {source}", path.display())]
    LocalWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Rotating reference {} failed: {source}", path.display())]
    Rotation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Remote call {method} failed: {source}")]
    RemoteCall { method: String, source: StoreError },

    #[error("Records file {}: {reason}", path.display())]
    RecordsFile { path: PathBuf, reason: String },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl SyncError {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidConfig(_) => "invalid_config",
            SyncError::SourceMissing { .. } => "source_missing",
            SyncError::SizeUnavailable { .. } => "size_unavailable",
            SyncError::LocalReadFailed { .. } => "local_read_failed",
            SyncError::ReferenceInconsistent { .. } => "reference_inconsistent",
            SyncError::RemoteWriteFailed { .. } => "remote_write_failed",
            SyncError::RemoteReadFailed { .. } => "remote_read_failed",
            SyncError::LocalWriteFailed { .. } => "local_write_failed",
            SyncError::Rotation { .. } => "rotation",
            SyncError::RemoteCall { .. } => "remote_call",
            SyncError::RecordsFile { .. } => "records_file",
            SyncError::InvalidStateTransition(_) => "invalid_state_transition",
        }
    }

    /// Errors caused by bad data on disk rather than I/O
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, SyncError::ReferenceInconsistent { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
