// Snapshot Store Port
// Durable storage for the serialized job map (primary + backup copy)

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Primary snapshot, `None` when it does not exist yet
    async fn read_primary(&self) -> Result<Option<String>>;

    /// Backup snapshot, `None` when it does not exist
    async fn read_backup(&self) -> Result<Option<String>>;

    /// Copy the current primary over the backup
    async fn backup(&self) -> Result<()>;

    /// Replace the primary snapshot
    async fn write(&self, contents: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory snapshot pair with switchable write failures
    #[derive(Default)]
    pub struct MemorySnapshotStore {
        primary: Mutex<Option<String>>,
        backup: Mutex<Option<String>>,
        fail_writes: AtomicBool,
        writes: AtomicUsize,
    }

    impl MemorySnapshotStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_primary(self, contents: impl Into<String>) -> Self {
            *self.primary.lock().unwrap() = Some(contents.into());
            self
        }

        pub fn with_backup(self, contents: impl Into<String>) -> Self {
            *self.backup.lock().unwrap() = Some(contents.into());
            self
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn primary(&self) -> Option<String> {
            self.primary.lock().unwrap().clone()
        }

        pub fn backup_contents(&self) -> Option<String> {
            self.backup.lock().unwrap().clone()
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotStore for MemorySnapshotStore {
        async fn read_primary(&self) -> Result<Option<String>> {
            Ok(self.primary.lock().unwrap().clone())
        }

        async fn read_backup(&self) -> Result<Option<String>> {
            Ok(self.backup.lock().unwrap().clone())
        }

        async fn backup(&self) -> Result<()> {
            let primary = self.primary.lock().unwrap().clone();
            if primary.is_some() {
                *self.backup.lock().unwrap() = primary;
            }
            Ok(())
        }

        async fn write(&self, contents: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Persistence("disk full".to_string()));
            }
            *self.primary.lock().unwrap() = Some(contents.to_string());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
