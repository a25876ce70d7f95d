// SSH SFTP Client
// File operations over the sftp subsystem of a session channel

use async_trait::async_trait;
use orchestrator_core::port::{RemoteEntry, SftpClient, TransportError, TransportResult};
use russh::client::Msg;
use russh::Channel;
use russh_sftp::client::SftpSession;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

fn sftp_err(e: russh_sftp::client::error::Error) -> TransportError {
    TransportError::Sftp(e.to_string())
}

fn io_err(e: std::io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

/// `/a/b/c` -> `["/a", "/a/b", "/a/b/c"]`; relative paths stay relative
fn ancestors(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut out = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        out.push(current.clone());
    }
    out
}

pub struct SshSftp {
    session: SftpSession,
}

impl SshSftp {
    pub(crate) async fn open(channel: Channel<Msg>) -> TransportResult<Self> {
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        let session = SftpSession::new(channel.into_stream()).await.map_err(sftp_err)?;
        Ok(Self { session })
    }
}

#[async_trait]
impl SftpClient for SshSftp {
    async fn exists(&self, path: &str) -> TransportResult<bool> {
        self.session.try_exists(path).await.map_err(sftp_err)
    }

    async fn is_dir(&self, path: &str) -> TransportResult<bool> {
        let metadata = self.session.metadata(path).await.map_err(sftp_err)?;
        Ok(metadata.is_dir())
    }

    async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>> {
        let entries = self.session.read_dir(path).await.map_err(sftp_err)?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteEntry {
                is_dir: entry.file_type().is_dir(),
                name: entry.file_name(),
            })
            .collect())
    }

    async fn mkdir_all(&self, path: &str) -> TransportResult<()> {
        for dir in ancestors(path) {
            if self.session.try_exists(dir.as_str()).await.map_err(sftp_err)? {
                continue;
            }
            debug!(dir = %dir, "Creating remote directory");
            self.session.create_dir(dir.as_str()).await.map_err(sftp_err)?;
        }
        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> TransportResult<u64> {
        let mut source = tokio::fs::File::open(local).await.map_err(io_err)?;
        let mut target = self.session.create(remote).await.map_err(sftp_err)?;
        let bytes = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;
        target
            .shutdown()
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;
        Ok(bytes)
    }

    async fn download_file(&self, remote: &str, local: &Path) -> TransportResult<u64> {
        let mut source = self.session.open(remote).await.map_err(sftp_err)?;
        let mut target = tokio::fs::File::create(local).await.map_err(io_err)?;
        let bytes = tokio::io::copy(&mut source, &mut target).await.map_err(io_err)?;
        target.flush().await.map_err(io_err)?;
        Ok(bytes)
    }

    async fn close(&self) -> TransportResult<()> {
        self.session.close().await.map_err(sftp_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/srv/app/logs"), vec!["/srv", "/srv/app", "/srv/app/logs"]);
        assert_eq!(ancestors("data/in/"), vec!["data", "data/in"]);
        assert_eq!(ancestors("./out"), vec!["out"]);
        assert!(ancestors("/").is_empty());
    }
}
