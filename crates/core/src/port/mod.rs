// Port Layer - Interfaces for external dependencies

pub mod alias_resolver;
pub mod audit;
pub mod id_provider; // For deterministic testing
pub mod snapshot_store;
pub mod time_provider;
pub mod transport;

// Re-exports
pub use alias_resolver::{AliasResolver, CatalogUpdate, ServerCatalog};
pub use audit::{AuditEntry, AuditSink};
pub use id_provider::{IdProvider, ShortUuidProvider};
pub use snapshot_store::SnapshotStore;
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transport::{
    ChannelEvent, ConnectOptions, RemoteChannel, RemoteEntry, RemoteSession, RemoteTransport,
    SftpClient, TransportError, TransportResult,
};
