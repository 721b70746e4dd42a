use crate::snapshot::source::read_exact_at;
use crate::sync::error::{SyncError, SyncResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

/// Baseline snapshot consulted during a push.
///
/// The length measured at [`ReferenceSnapshot::open`] is authoritative for the
/// whole pass. A block that does not fit inside it is reported as
/// [`SyncError::ReferenceInconsistent`] before any bytes are read; blocks are
/// never zero-padded and never returned short.
pub struct ReferenceSnapshot {
    path: PathBuf,
    file: File,
    len: u64,
}

impl ReferenceSnapshot {
    /// `Ok(None)` when no reference exists at `path`
    pub async fn open(path: &Path) -> SyncResult<Option<Self>> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No reference snapshot at {}", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(SyncError::LocalReadFailed {
                    path: path.to_path_buf(),
                    offset: 0,
                    length: 0,
                    source,
                })
            }
        };

        let len = file
            .metadata()
            .await
            .map_err(|source| SyncError::LocalReadFailed {
                path: path.to_path_buf(),
                offset: 0,
                length: 0,
                source,
            })?
            .len();

        debug!("Opened reference {} ({} bytes)", path.display(), len);

        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
            len,
        }))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_block(&mut self, offset: u64, length: u64) -> SyncResult<Vec<u8>> {
        let end = offset.checked_add(length);
        if end.map_or(true, |end| end > self.len) {
            return Err(SyncError::ReferenceInconsistent {
                path: self.path.clone(),
                offset,
                length,
                reference_len: self.len,
            });
        }

        read_exact_at(&mut self.file, &self.path, offset, length).await
    }
}
