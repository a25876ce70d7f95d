// File Snapshot Store
// queue.json plus queue.json.backup under the data directory

use crate::file::{read_optional, write_atomic};
use crate::{SNAPSHOT_BACKUP_FILE, SNAPSHOT_FILE};
use async_trait::async_trait;
use orchestrator_core::error::{AppError, Result};
use orchestrator_core::port::SnapshotStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileSnapshotStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl FileSnapshotStore {
    /// # Arguments
    /// * `data_dir` - Directory holding `queue.json` and its backup
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            primary: data_dir.join(SNAPSHOT_FILE),
            backup: data_dir.join(SNAPSHOT_BACKUP_FILE),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read_primary(&self) -> Result<Option<String>> {
        read_optional(&self.primary).await
    }

    async fn read_backup(&self) -> Result<Option<String>> {
        read_optional(&self.backup).await
    }

    async fn backup(&self) -> Result<()> {
        match tokio::fs::copy(&self.primary, &self.backup).await {
            Ok(bytes) => {
                debug!(bytes, path = %self.backup.display(), "Snapshot backed up");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Persistence(format!(
                "{}: {}",
                self.backup.display(),
                e
            ))),
        }
    }

    async fn write(&self, contents: &str) -> Result<()> {
        write_atomic(&self.primary, contents).await
    }
}
