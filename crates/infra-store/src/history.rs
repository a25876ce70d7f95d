// JSON Audit History
// history.json: submitted jobs, newest first, bounded

use crate::file::{read_json, write_json};
use crate::HISTORY_FILE;
use async_trait::async_trait;
use orchestrator_core::error::Result;
use orchestrator_core::port::{AuditEntry, AuditSink};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const HISTORY_CAPACITY: usize = 500;

pub struct JsonAuditHistory {
    path: PathBuf,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl JsonAuditHistory {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::with_capacity(data_dir, HISTORY_CAPACITY)
    }

    pub fn with_capacity(data_dir: impl AsRef<Path>, capacity: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(HISTORY_FILE),
            capacity,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonAuditHistory {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut history: Vec<AuditEntry> = read_json(&self.path).await?;
        history.insert(0, entry);
        history.truncate(self.capacity);
        write_json(&self.path, &history).await
    }

    async fn recent(&self, alias: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        let history: Vec<AuditEntry> = read_json(&self.path).await?;
        Ok(history
            .into_iter()
            .filter(|entry| alias.map_or(true, |a| entry.alias == a))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, alias: &str) -> AuditEntry {
        AuditEntry {
            job_id: id.to_string(),
            timestamp: 1_700_000_000_000,
            job_type: "ssh".to_string(),
            alias: alias.to_string(),
            command: "uptime".to_string(),
        }
    }

    #[tokio::test]
    async fn test_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonAuditHistory::with_capacity(dir.path(), 3);
        for i in 0..5 {
            history.record(entry(&format!("job{}", i), "web")).await.unwrap();
        }

        let recent = history.recent(None, 10).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|e| e.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job4", "job3", "job2"]);
    }

    #[tokio::test]
    async fn test_filter_by_alias() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonAuditHistory::new(dir.path());
        history.record(entry("a", "web")).await.unwrap();
        history.record(entry("b", "db")).await.unwrap();
        history.record(entry("c", "web")).await.unwrap();

        let web = history.recent(Some("web"), 10).await.unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].job_id, "c");
        assert_eq!(history.recent(Some("web"), 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entries_use_type_key() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonAuditHistory::new(dir.path());
        history.record(entry("a", "web")).await.unwrap();
        let raw = tokio::fs::read_to_string(dir.path().join(HISTORY_FILE)).await.unwrap();
        assert!(raw.contains("\"type\": \"ssh\""));
    }
}
