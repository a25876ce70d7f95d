// File helpers shared by the JSON adapters

use orchestrator_core::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// File contents, `None` when the file does not exist
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Persistence(format!("{}: {}", path.display(), e))),
    }
}

/// Replace `path` through a sibling temp file and a rename
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| AppError::Persistence(format!("{}: {}", path.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Persistence(format!("{}: {}", path.display(), e)))
}

/// Parse a JSON document, `T::default()` when the file is missing
pub(crate) async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match read_optional(path).await? {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(T::default()),
    }
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    write_atomic(path, &contents).await
}
