// Audit Sink Port
// Append-only record of submitted jobs

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One submitted job as seen by the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub job_id: String,
    pub timestamp: i64, // epoch ms
    #[serde(rename = "type")]
    pub job_type: String,
    pub alias: String,
    /// Command line, joined sequence or transfer summary
    pub command: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;

    /// Newest first, optionally restricted to one alias
    async fn recent(&self, alias: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryAuditSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl MemoryAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entries(&self) -> Vec<AuditEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditSink for MemoryAuditSink {
        async fn record(&self, entry: AuditEntry) -> Result<()> {
            self.entries.lock().unwrap().insert(0, entry);
            Ok(())
        }

        async fn recent(&self, alias: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| alias.map_or(true, |a| e.alias == a))
                .take(limit)
                .cloned()
                .collect())
        }
    }
}
