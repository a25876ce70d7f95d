// Application Layer - Use Cases and Services

pub mod constants;
pub mod executor;
pub mod lifecycle;
pub mod maintenance;
pub mod pool;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod shutdown;
pub mod submit;

// Re-exports
pub use executor::JobExecutor;
pub use lifecycle::{Orchestrator, OrchestratorPorts};
pub use maintenance::{MaintenanceIntervals, MaintenanceScheduler};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use queue::{DiagnosticLog, JobQueue, LogEntry, LogLevel, LogQuery, QueueStats};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use submit::{JobView, SubmitRequest, Submission, TaskService};
