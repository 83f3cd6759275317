//! Local artifact lifecycle.
//!
//! Each cycle persists the captured frame to a file it owns exclusively. The
//! file is removed by [`LocalArtifact::release`] at the end of the cycle and,
//! should the cycle be cancelled or panic before that point, by `Drop`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error_handling::types::ArtifactError;

/// Generates a name unique across rapid-fire and concurrent cycles:
/// `photo_<UTC timestamp, microseconds>_<random suffix>.<ext>`.
pub fn artifact_name(trigger_time: DateTime<Utc>, extension: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "photo_{}_{}.{}",
        trigger_time.format("%Y%m%dT%H%M%S%6fZ"),
        &suffix[..8],
        extension.trim_start_matches('.')
    )
}

/// Removes artifacts and camera scratch frames left in `dir` by a previous
/// process that died mid-cycle. Returns how many files were removed.
pub fn sweep_stale(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with("photo_") || name.starts_with("frame-")) {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Removed stale artifact {}", name);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove stale artifact {}: {}", name, e),
        }
    }
    Ok(removed)
}

#[derive(Debug)]
pub struct LocalArtifact {
    name: String,
    path: PathBuf,
    released: bool,
}

impl LocalArtifact {
    /// Writes `bytes` to `<dir>/<name>`. Fails if the file already exists.
    pub async fn create(dir: &Path, name: &str, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let path = dir.join(name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(ArtifactError::CreateFailed)?;

        // From here on the file is ours; a failed write still gets removed on drop.
        let artifact = Self {
            name: name.to_string(),
            path,
            released: false,
        };

        file.write_all(bytes)
            .await
            .map_err(ArtifactError::CreateFailed)?;
        file.flush().await.map_err(ArtifactError::CreateFailed)?;

        debug!("[{}] local artifact written ({} bytes)", artifact.name, bytes.len());
        Ok(artifact)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>, ArtifactError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(ArtifactError::ReadFailed)
    }

    /// Deletes the file. A file that is already gone counts as released.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("[{}] local artifact released", self.name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[{}] failed to remove local artifact {}: {}",
                self.name,
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for LocalArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("[{}] local artifact removed on drop", self.name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[{}] failed to remove local artifact {}: {}",
                self.name,
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn names_do_not_collide() {
        let now = Utc::now();
        let names: HashSet<String> = (0..1000).map(|_| artifact_name(now, "jpg")).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| n.starts_with("photo_") && n.ends_with(".jpg")));
    }

    #[test]
    fn extension_dot_is_normalized() {
        assert!(artifact_name(Utc::now(), ".png").ends_with(".png"));
        assert!(!artifact_name(Utc::now(), ".png").contains("..png"));
    }

    #[tokio::test]
    async fn release_removes_file() {
        let dir = tempdir().unwrap();
        let artifact = LocalArtifact::create(dir.path(), "a.jpg", b"data").await.unwrap();
        let path = artifact.path().to_path_buf();
        assert_eq!(artifact.read().await.unwrap(), b"data");

        artifact.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_file() {
        let dir = tempdir().unwrap();
        let path = {
            let artifact = LocalArtifact::create(dir.path(), "b.jpg", b"data").await.unwrap();
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn sweep_removes_only_leftovers() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("photo_20240101T000000000000Z_abcd1234.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("frame-a1b2.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        std::fs::create_dir(dir.path().join("photo_dir")).unwrap();

        assert_eq!(sweep_stale(dir.path()).unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("photo_dir").exists());
        assert_eq!(sweep_stale(dir.path()).unwrap(), 0);
    }

    #[tokio::test]
    async fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("c.jpg");
        std::fs::write(&existing, b"keep").unwrap();

        let res = LocalArtifact::create(dir.path(), "c.jpg", b"new").await;
        assert!(matches!(res, Err(ArtifactError::CreateFailed(_))));
        // the pre-existing file is not ours and must survive
        assert_eq!(std::fs::read(&existing).unwrap(), b"keep");
    }
}
