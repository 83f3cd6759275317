use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info};
use tempfile::NamedTempFile;

use crate::configuration::types::{StorageConfig, Visibility};
use crate::error_handling::types::{ConfigError, TransferError};
use crate::storage::storage_trait::ArtifactStore;

/// Directory-backed artifact store laid out like a bucket:
/// `<root>/<bucket>/<prefix>/<artifact name>`.
///
/// URLs depend on the configured visibility. Public artifacts resolve to
/// `<public_base_url>/<bucket>/<path>` (whatever serves `root` over HTTP must
/// be set up separately); private artifacts resolve to a `file://` URL that
/// is only meaningful on the device itself.
pub struct FileArtifactStore {
    bucket_dir: PathBuf,
    bucket: String,
    visibility: Visibility,
    public_base_url: Option<String>,
}

impl FileArtifactStore {
    pub fn new<P: AsRef<Path>>(
        root: P,
        bucket: &str,
        visibility: Visibility,
        public_base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        if bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        let public_base_url = public_base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        if visibility == Visibility::Public && public_base_url.is_none() {
            return Err(ConfigError::MissingPublicUrl);
        }

        let bucket_dir = root.as_ref().join(bucket);
        std::fs::create_dir_all(&bucket_dir).map_err(|e| {
            error!(
                "Failed to create bucket dir {}: {}",
                bucket_dir.display(),
                e
            );
            ConfigError::IoError(e)
        })?;
        info!(
            "FileArtifactStore initialized at {} ({:?})",
            bucket_dir.display(),
            visibility
        );

        Ok(Self {
            bucket_dir,
            bucket: bucket.to_string(),
            visibility,
            public_base_url,
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.root,
            &config.bucket,
            config.visibility,
            config.public_base_url.clone(),
        )
    }

    /// Maps an object path onto the bucket directory, refusing anything that
    /// would escape it.
    fn object_path(&self, path: &str) -> Result<PathBuf, TransferError> {
        let relative = Path::new(path);
        let mut has_name = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => has_name = true,
                _ => return Err(TransferError::InvalidPath(path.to_string())),
            }
        }
        if !has_name {
            return Err(TransferError::InvalidPath(path.to_string()));
        }
        Ok(self.bucket_dir.join(relative))
    }

    fn resolve_url(&self, path: &str, stored: &Path) -> Result<String, TransferError> {
        match self.visibility {
            Visibility::Public => match &self.public_base_url {
                Some(base) => Ok(format!("{}/{}/{}", base, self.bucket, path)),
                None => Err(TransferError::UrlUnresolvable(String::from(
                    "no public base URL configured",
                ))),
            },
            Visibility::Private => {
                let absolute = std::fs::canonicalize(stored).map_err(|e| {
                    TransferError::UrlUnresolvable(format!("{}: {}", stored.display(), e))
                })?;
                Ok(format!("file://{}", absolute.display()))
            }
        }
    }
}

fn write_object(target: &Path, bytes: &[u8]) -> Result<(), TransferError> {
    let dir = target
        .parent()
        .ok_or_else(|| TransferError::InvalidPath(target.display().to_string()))?;
    std::fs::create_dir_all(dir).map_err(TransferError::WriteFailed)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(TransferError::WriteFailed)?;
    tmp.write_all(bytes).map_err(TransferError::WriteFailed)?;
    tmp.as_file().sync_all().map_err(TransferError::WriteFailed)?;
    tmp.persist(target)
        .map_err(|e| TransferError::WriteFailed(e.error))?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, TransferError> {
        let target = self.object_path(path)?;
        let size = bytes.len();

        let destination = target.clone();
        tokio::task::spawn_blocking(move || write_object(&destination, &bytes))
            .await
            .map_err(|e| TransferError::WriteFailed(std::io::Error::other(e.to_string())))??;

        let url = self.resolve_url(path, &target)?;
        debug!("Stored {} bytes at {} -> {}", size, target.display(), url);
        Ok(url)
    }
}
