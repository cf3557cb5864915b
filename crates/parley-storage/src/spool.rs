use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::StorageError;

/// Transient local holding area for uploads in flight to durable storage.
///
/// Each payload is written under a timestamp-prefixed name so concurrent
/// uploads of the same file name cannot collide. Files here are scoped to a
/// single upload operation and must be removed on every exit path.
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub async fn new(dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir).await?;
        info!("Upload spool directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an incoming payload to the spool. Any directory components in
    /// the client-supplied name are stripped; only the final component is
    /// kept.
    pub async fn write(&self, file_name: &str, data: &[u8]) -> Result<SpooledFile, StorageError> {
        let base = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        let key = format!("{}_{}", chrono::Utc::now().timestamp_millis(), base);
        let path = self.dir.join(&key);

        fs::write(&path, data).await?;
        debug!("Spooled {} bytes to {}", data.len(), path.display());

        Ok(SpooledFile { key, path })
    }
}

/// A spooled payload awaiting upload. Callers must invoke `remove` once the
/// upload settles, whatever its outcome.
pub struct SpooledFile {
    pub key: String,
    pub path: PathBuf,
}

impl SpooledFile {
    /// Delete the transient copy. Removal failures are logged, not
    /// propagated, so cleanup cannot mask the upload outcome.
    pub async fn remove(self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed spooled file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Spooled file {} already gone", self.path.display());
            }
            Err(e) => warn!("Failed to remove spooled file {}: {}", self.path.display(), e),
        }
    }
}
