// Diagnostic Log
// Bounded ring of recent queue/pool/executor events, mirrored to tracing

use crate::port::TimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: i64, // epoch ms
}

/// Filter for `DiagnosticLog::query`; empty matches everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    /// Minimum timestamp (epoch ms)
    pub since: Option<i64>,
    /// Case-insensitive substring
    pub search: Option<String>,
    /// Keep only the newest N matches
    pub limit: Option<usize>,
}

pub struct DiagnosticLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    time_provider: Arc<dyn TimeProvider>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            time_provider,
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: "orchestrator::diag", "{}", message),
            LogLevel::Info => tracing::info!(target: "orchestrator::diag", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "orchestrator::diag", "{}", message),
            LogLevel::Error => tracing::error!(target: "orchestrator::diag", "{}", message),
        }

        let entry = LogEntry {
            level,
            message,
            timestamp: self.time_provider.now_millis(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Matching entries, oldest first
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|e| query.level.map_or(true, |l| e.level == l))
            .filter(|e| query.since.map_or(true, |t| e.timestamp >= t))
            .filter(|e| {
                needle
                    .as_ref()
                    .map_or(true, |n| e.message.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::ManualClock;

    fn log_with_clock(capacity: usize) -> (DiagnosticLog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        (DiagnosticLog::new(capacity, clock.clone()), clock)
    }

    #[test]
    fn test_ring_drops_oldest() {
        let (log, _) = log_with_clock(3);
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }
        let all = log.query(&LogQuery::default());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "entry 2");
        assert_eq!(all[2].message, "entry 4");
    }

    #[test]
    fn test_filters_combine() {
        let (log, clock) = log_with_clock(10);
        log.info("Job abc started");
        clock.advance(500);
        log.error("Job ABC failed: exit 2");
        log.error("pool timeout for web1");

        let found = log.query(&LogQuery {
            level: Some(LogLevel::Error),
            since: Some(1_500),
            search: Some("abc".to_string()),
            limit: None,
        });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Job ABC failed: exit 2");
    }

    #[test]
    fn test_limit_keeps_newest() {
        let (log, _) = log_with_clock(10);
        log.info("one");
        log.info("two");
        log.info("three");
        let tail = log.query(&LogQuery {
            limit: Some(2),
            ..Default::default()
        });
        let messages: Vec<_> = tail.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
