use crate::sync::error::{SyncError, SyncResult};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Local snapshot file read block by block
pub struct SourceFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl SourceFile {
    /// Open `path`; its length at this moment defines the pass
    pub async fn open(path: &Path) -> SyncResult<Self> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::SourceMissing {
                    path: path.to_path_buf(),
                })
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

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
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

    /// Exactly `length` bytes at `offset`; a file that shrank since open fails
    pub async fn read_block(&mut self, offset: u64, length: u64) -> SyncResult<Vec<u8>> {
        read_exact_at(&mut self.file, &self.path, offset, length).await
    }
}

pub(crate) async fn read_exact_at(
    file: &mut File,
    path: &Path,
    offset: u64,
    length: u64,
) -> SyncResult<Vec<u8>> {
    let to_error = |source| SyncError::LocalReadFailed {
        path: path.to_path_buf(),
        offset,
        length,
        source,
    };

    file.seek(SeekFrom::Start(offset)).await.map_err(to_error)?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer).await.map_err(to_error)?;
    Ok(buffer)
}
