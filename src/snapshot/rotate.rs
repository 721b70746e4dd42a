use crate::sync::error::{SyncError, SyncResult};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Temporary sibling of `target`, renamed over it once complete
pub(crate) fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    target.with_file_name(format!(".{}.{}.partial", name, Uuid::new_v4().simple()))
}

/// Replace the reference with the source that was just pushed.
///
/// The copy lands in a temporary file next to the reference and is renamed
/// into place, so a reader never sees a half-written baseline.
pub async fn rotate_reference(source: &Path, reference: &Path) -> SyncResult<u64> {
    let temp = temp_sibling(reference);
    let to_error = |source| SyncError::Rotation {
        path: reference.to_path_buf(),
        source,
    };

    let copied = match tokio::fs::copy(source, &temp).await {
        Ok(copied) => copied,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(to_error(e));
        }
    };

    if let Err(e) = tokio::fs::rename(&temp, reference).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(to_error(e));
    }

    info!(
        "Rotated reference {} <- {} ({} bytes)",
        reference.display(),
        source.display(),
        copied
    );
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rotate_replaces_reference() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("snap.dat");
        let reference = dir.path().join("snap.dat.orig");
        tokio::fs::write(&source, b"new contents").await.unwrap();
        tokio::fs::write(&reference, b"old").await.unwrap();

        let copied = rotate_reference(&source, &reference).await.unwrap();
        assert_eq!(copied, 12);
        assert_eq!(tokio::fs::read(&reference).await.unwrap(), b"new contents");

        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(!entries.any(|e| e.unwrap().file_name().to_string_lossy().ends_with(".partial")));
    }

    #[tokio::test]
    async fn test_rotate_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = rotate_reference(
            &dir.path().join("missing.dat"),
            &dir.path().join("missing.dat.orig"),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Rotation { .. })));
    }

    #[test]
    fn test_temp_sibling_stays_in_directory() {
        let target = Path::new("/data/backups/stable.dat");
        let temp = temp_sibling(target);
        assert_eq!(temp.parent(), target.parent());
        assert!(temp.to_string_lossy().ends_with(".partial"));
    }
}
