// SSH Transport (russh)
// Opens authenticated sessions; each session hands out exec, shell and SFTP channels

use crate::channel::SshChannel;
use crate::sftp::SshSftp;
use async_trait::async_trait;
use orchestrator_core::domain::{AuthMethod, ServerConfig};
use orchestrator_core::port::{
    ConnectOptions, RemoteChannel, RemoteSession, RemoteTransport, SftpClient, TransportError,
    TransportResult,
};
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key;
use std::sync::Arc;
use tracing::{debug, info};

/// Terminal geometry requested for pty channels
const PTY_TERM: &str = "xterm";
const PTY_COLUMNS: u32 = 200;
const PTY_ROWS: u32 = 50;

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    // Host keys are not pinned: catalog entries carry no fingerprint
    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

enum Credentials {
    Key(Arc<key::KeyPair>),
    Password(String),
}

/// Load a private key, expanding a leading `~`
fn load_key(path: &str) -> TransportResult<key::KeyPair> {
    let expanded = shellexpand::tilde(path);
    russh_keys::load_secret_key(expanded.as_ref(), None)
        .map_err(|e| TransportError::Key(format!("{}: {}", expanded, e)))
}

fn credentials(server: &ServerConfig) -> TransportResult<Credentials> {
    match server.auth_method() {
        Some(AuthMethod::Key(path)) => Ok(Credentials::Key(Arc::new(load_key(path)?))),
        Some(AuthMethod::Password(password)) => Ok(Credentials::Password(password.to_string())),
        None => Err(TransportError::Auth(format!(
            "no key path or password configured for {}@{}",
            server.user, server.host
        ))),
    }
}

fn channel_err(e: russh::Error) -> TransportError {
    TransportError::Channel(e.to_string())
}

/// SSH implementation of the transport port
#[derive(Debug, Clone, Default)]
pub struct SshTransport;

impl SshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn connect(
        &self,
        server: &ServerConfig,
        options: &ConnectOptions,
    ) -> TransportResult<Arc<dyn RemoteSession>> {
        // Key problems surface before any network traffic
        let credentials = credentials(server)?;
        let config = Arc::new(client::Config {
            keepalive_interval: Some(options.keepalive_interval),
            ..Default::default()
        });

        debug!(host = %server.host, port = server.port, "Opening SSH connection");
        let connecting = client::connect(config, (server.host.as_str(), server.port), ClientHandler);
        let mut handle = tokio::time::timeout(options.connect_timeout, connecting)
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "{}:{} timed out after {}ms",
                    server.host,
                    server.port,
                    options.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::Connect(format!("{}:{}: {}", server.host, server.port, e)))?;

        let accepted = match credentials {
            Credentials::Key(key) => handle.authenticate_publickey(&server.user, key).await,
            Credentials::Password(password) => {
                handle.authenticate_password(&server.user, password).await
            }
        }
        .map_err(|e| TransportError::Auth(e.to_string()))?;
        if !accepted {
            return Err(TransportError::Auth(format!(
                "{}@{} rejected the credentials",
                server.user, server.host
            )));
        }

        info!(host = %server.host, port = server.port, user = %server.user, "SSH session established");
        Ok(Arc::new(SshSession {
            handle,
            label: format!("{}@{}:{}", server.user, server.host, server.port),
        }))
    }
}

/// One authenticated SSH connection
pub struct SshSession {
    handle: Handle<ClientHandler>,
    label: String,
}

impl SshSession {
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn is_healthy(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn exec(&self, command: &str, pty: bool) -> TransportResult<Box<dyn RemoteChannel>> {
        let mut channel = self.handle.channel_open_session().await.map_err(channel_err)?;
        if pty {
            channel
                .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
                .await
                .map_err(channel_err)?;
        }
        channel.exec(true, command).await.map_err(channel_err)?;
        debug!(session = %self.label, command = %command, "Exec channel opened");
        Ok(Box::new(SshChannel::new(channel)))
    }

    async fn shell(&self) -> TransportResult<Box<dyn RemoteChannel>> {
        let mut channel = self.handle.channel_open_session().await.map_err(channel_err)?;
        channel
            .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(channel_err)?;
        channel.request_shell(true).await.map_err(channel_err)?;
        debug!(session = %self.label, "Shell channel opened");
        Ok(Box::new(SshChannel::new(channel)))
    }

    async fn sftp(&self) -> TransportResult<Box<dyn SftpClient>> {
        let channel = self.handle.channel_open_session().await.map_err(channel_err)?;
        Ok(Box::new(SshSftp::open(channel).await?))
    }

    async fn close(&self) -> TransportResult<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        debug!(session = %self.label, "Disconnecting");
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(channel_err)
    }
}
