// Orchestrator Infrastructure - JSON File Adapters
// Implements: SnapshotStore, AliasResolver (server catalog), AuditSink (history)

mod catalog;
mod file;
mod history;
mod snapshot;

pub use catalog::JsonServerCatalog;
pub use history::{JsonAuditHistory, HISTORY_CAPACITY};
pub use snapshot::FileSnapshotStore;

pub const SNAPSHOT_FILE: &str = "queue.json";
pub const SNAPSHOT_BACKUP_FILE: &str = "queue.json.backup";
pub const SERVERS_FILE: &str = "servers.json";
pub const HISTORY_FILE: &str = "history.json";
