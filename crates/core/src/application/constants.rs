// Application constants (no magic values in service code)
use std::time::Duration;

/// Poll interval of `TaskService::wait_for_completion`
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Attempts at drawing a job id that is not already taken
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Length of the random suffix in connection ids
pub const CONNECTION_SUFFIX_LEN: usize = 9;

/// Interrupt byte sent to pooled channels on timeout or line cap (Ctrl+C)
pub const CTRL_C: &[u8] = b"\x03";

/// Exit code reported when a command is cut off by its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Marker halves printed by interactive sessions to signal completion
pub const MARKER_PREFIX: &str = "__ORCH_";
pub const MARKER_SUFFIX: &str = "DONE_";

/// Tail size returned by `task_logs` when no limit is given
pub const DEFAULT_LOG_TAIL: usize = 50;
