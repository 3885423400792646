//! Archive persistence.

use std::path::Path;

use fleetsnap_common::Result;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Writes `payload` to `<dir>/<filename>`, syncs it to stable storage, and
/// returns the byte count. An existing file of the same name is replaced.
pub async fn write_archive(dir: &Path, filename: &str, payload: &[u8]) -> Result<u64> {
    let target = dir.join(filename);
    let mut file = File::create(&target).await?;
    file.write_all(payload).await?;
    file.sync_all().await?;
    debug!(path = %target.display(), bytes = payload.len(), "archive written");
    Ok(payload.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_persists_bytes_and_reports_length() {
        let dir = tempfile::tempdir().unwrap();

        let written = write_archive(dir.path(), "web.tar.xz", b"archive bytes")
            .await
            .unwrap();

        assert_eq!(written, 13);
        let on_disk = tokio::fs::read(dir.path().join("web.tar.xz")).await.unwrap();
        assert_eq!(on_disk, b"archive bytes");
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_a_local_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-subdir");

        let err = write_archive(&missing, "web.tar.xz", b"x").await.unwrap_err();

        assert!(matches!(
            err,
            fleetsnap_common::FleetsnapError::LocalIo(_)
        ));
    }
}
