// Orchestrator Infrastructure - SSH Adapters
// Implements: RemoteTransport, RemoteSession, RemoteChannel, SftpClient

mod channel;
mod sftp;
mod transport;

pub use channel::SshChannel;
pub use sftp::SshSftp;
pub use transport::{SshSession, SshTransport};
