// Orchestrator Core - Domain Logic, Ports & Application Services
// NO transport or storage dependencies: adapters live in infra crates

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::OrchestratorConfig;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
