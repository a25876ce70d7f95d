// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod server;

// Re-exports
pub use error::DomainError;
pub use job::{
    CommandSpec, CustomSpec, FailedFile, Job, JobId, JobPatch, JobResult, JobSpec, JobStatus,
    NewJob, SequenceSpec, SequenceStep, StepResult, TransferDirection, TransferPair,
    TransferSpec,
};
pub use server::{AuthMethod, ServerConfig, DEFAULT_SSH_PORT};
