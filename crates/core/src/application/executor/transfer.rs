// SFTP transfer planning and execution
// Expands globs and directories into per-file operations, aggregates per-file results

use crate::domain::{FailedFile, TransferDirection, TransferPair, TransferSpec};
use crate::port::{SftpClient, TransportError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-file aggregate of one transfer job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub succeeded: usize,
    pub failed: Vec<FailedFile>,
    pub bytes: u64,
}

impl TransferReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    fn fail(&mut self, file: impl Into<String>, error: impl ToString) {
        let file = file.into();
        let error = error.to_string();
        warn!(file = %file, error = %error, "Transfer of file failed");
        self.failed.push(FailedFile { file, error });
    }

    fn ok(&mut self, bytes: u64) {
        self.succeeded += 1;
        self.bytes += bytes;
    }

    /// `Transfer <direction>: S/T files succeeded`, plus the failed names
    pub fn summary(&self, direction: TransferDirection) -> String {
        let mut summary = format!(
            "Transfer {}: {}/{} files succeeded",
            direction,
            self.succeeded,
            self.total()
        );
        if !self.failed.is_empty() {
            let names: Vec<&str> = self.failed.iter().map(|f| f.file.as_str()).collect();
            summary.push_str(&format!("\nFailed: {}", names.join(", ")));
        }
        summary
    }
}

fn has_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

fn remote_join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent of a remote path, `None` for relative single components
fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

fn remote_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit_once('/').map_or(trimmed, |(_, name)| name)
}

fn local_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Run every pair of a transfer spec over one SFTP client
pub async fn run_transfer(sftp: &dyn SftpClient, spec: &TransferSpec) -> TransferReport {
    let mut report = TransferReport::default();
    for pair in &spec.files {
        match spec.direction {
            TransferDirection::Upload => upload_pair(sftp, pair, &mut report).await,
            TransferDirection::Download => download_pair(sftp, pair, &mut report).await,
        }
    }
    report
}

async fn upload_pair(sftp: &dyn SftpClient, pair: &TransferPair, report: &mut TransferReport) {
    if has_glob(&pair.local) {
        let paths = match glob::glob(&pair.local) {
            Ok(paths) => paths,
            Err(e) => return report.fail(&pair.local, format!("invalid pattern: {}", e)),
        };
        let mut matches: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
        matches.sort();
        if matches.is_empty() {
            return report.fail(&pair.local, "no local files match the pattern");
        }
        if let Err(e) = sftp.mkdir_all(&pair.remote).await {
            for path in &matches {
                report.fail(path.to_string_lossy(), &e);
            }
            return;
        }
        for path in matches {
            let target = remote_join(&pair.remote, &local_name(&path));
            upload_path(sftp, &path, &target, report).await;
        }
        return;
    }

    let local = PathBuf::from(&pair.local);
    if !local.is_dir() {
        if let Some(parent) = remote_parent(&pair.remote) {
            if let Err(e) = sftp.mkdir_all(parent).await {
                return report.fail(&pair.local, e);
            }
        }
    }
    upload_path(sftp, &local, &pair.remote, report).await;
}

/// Upload a file, or a directory tree, to `remote`
async fn upload_path(sftp: &dyn SftpClient, local: &Path, remote: &str, report: &mut TransferReport) {
    let mut pending: Vec<(PathBuf, String)> = vec![(local.to_path_buf(), remote.to_string())];

    while let Some((local, remote)) = pending.pop() {
        let metadata = match tokio::fs::metadata(&local).await {
            Ok(metadata) => metadata,
            Err(e) => {
                report.fail(local.to_string_lossy(), TransportError::Io(e.to_string()));
                continue;
            }
        };

        if !metadata.is_dir() {
            match sftp.upload_file(&local, &remote).await {
                Ok(bytes) => {
                    debug!(local = %local.display(), remote = %remote, bytes, "Uploaded");
                    report.ok(bytes);
                }
                Err(e) => report.fail(local.to_string_lossy(), e),
            }
            continue;
        }

        if let Err(e) = sftp.mkdir_all(&remote).await {
            report.fail(local.to_string_lossy(), e);
            continue;
        }
        let mut children = Vec::new();
        match tokio::fs::read_dir(&local).await {
            Ok(mut entries) => loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => children.push(entry.path()),
                    Ok(None) => break,
                    Err(e) => {
                        report.fail(local.to_string_lossy(), TransportError::Io(e.to_string()));
                        break;
                    }
                }
            },
            Err(e) => {
                report.fail(local.to_string_lossy(), TransportError::Io(e.to_string()));
                continue;
            }
        }
        // Reverse so the stack pops in name order
        children.sort();
        for child in children.into_iter().rev() {
            let target = remote_join(&remote, &local_name(&child));
            pending.push((child, target));
        }
    }
}

async fn download_pair(sftp: &dyn SftpClient, pair: &TransferPair, report: &mut TransferReport) {
    let name = remote_name(&pair.remote);
    if has_glob(name) {
        let parent = remote_parent(&pair.remote).unwrap_or(".");
        let pattern = match glob::Pattern::new(name) {
            Ok(pattern) => pattern,
            Err(e) => return report.fail(&pair.remote, format!("invalid pattern: {}", e)),
        };
        let mut entries = match sftp.list_dir(parent).await {
            Ok(entries) => entries,
            Err(e) => return report.fail(&pair.remote, e),
        };
        entries.retain(|entry| pattern.matches(&entry.name));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if entries.is_empty() {
            return report.fail(&pair.remote, "no remote files match the pattern");
        }
        let local_dir = PathBuf::from(&pair.local);
        if let Err(e) = tokio::fs::create_dir_all(&local_dir).await {
            return report.fail(&pair.local, TransportError::Io(e.to_string()));
        }
        for entry in entries {
            let remote = remote_join(parent, &entry.name);
            download_path(sftp, &remote, &local_dir.join(&entry.name), entry.is_dir, report).await;
        }
        return;
    }

    let is_dir = match sftp.is_dir(&pair.remote).await {
        Ok(is_dir) => is_dir,
        Err(e) => return report.fail(&pair.remote, e),
    };
    let local = PathBuf::from(&pair.local);
    if !is_dir {
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return report.fail(&pair.local, TransportError::Io(e.to_string()));
            }
        }
    }
    download_path(sftp, &pair.remote, &local, is_dir, report).await;
}

/// Download a file, or a directory tree, to `local`
async fn download_path(
    sftp: &dyn SftpClient,
    remote: &str,
    local: &Path,
    is_dir: bool,
    report: &mut TransferReport,
) {
    let mut pending: Vec<(String, PathBuf, bool)> = vec![(remote.to_string(), local.to_path_buf(), is_dir)];

    while let Some((remote, local, is_dir)) = pending.pop() {
        if !is_dir {
            match sftp.download_file(&remote, &local).await {
                Ok(bytes) => {
                    debug!(remote = %remote, local = %local.display(), bytes, "Downloaded");
                    report.ok(bytes);
                }
                Err(e) => report.fail(remote, e),
            }
            continue;
        }

        if let Err(e) = tokio::fs::create_dir_all(&local).await {
            report.fail(remote, TransportError::Io(e.to_string()));
            continue;
        }
        let mut entries = match sftp.list_dir(&remote).await {
            Ok(entries) => entries,
            Err(e) => {
                report.fail(remote, e);
                continue;
            }
        };
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        for entry in entries {
            pending.push((remote_join(&remote, &entry.name), local.join(&entry.name), entry.is_dir));
        }
    }
}
