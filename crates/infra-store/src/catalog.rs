// JSON Server Catalog
// servers.json: alias -> connection parameters, used for alias resolution

use crate::file::{read_json, write_json};
use crate::SERVERS_FILE;
use async_trait::async_trait;
use orchestrator_core::domain::ServerConfig;
use orchestrator_core::error::{AppError, Result};
use orchestrator_core::port::{AliasResolver, CatalogUpdate, ServerCatalog};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

type Catalog = BTreeMap<String, ServerConfig>;

pub struct JsonServerCatalog {
    path: PathBuf,
    // read-modify-write of the file
    write_lock: Mutex<()>,
}

impl JsonServerCatalog {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SERVERS_FILE),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Catalog> {
        read_json(&self.path).await
    }
}

#[async_trait]
impl AliasResolver for JsonServerCatalog {
    async fn resolve(&self, alias: &str) -> Result<ServerConfig> {
        self.load()
            .await?
            .remove(alias)
            .ok_or_else(|| AppError::UnknownAlias(alias.to_string()))
    }
}

#[async_trait]
impl ServerCatalog for JsonServerCatalog {
    /// Credentials left unset keep their stored value
    async fn add(&self, alias: &str, server: ServerConfig) -> Result<CatalogUpdate> {
        if alias.trim().is_empty() {
            return Err(AppError::Validation("alias cannot be empty".to_string()));
        }
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.load().await?;

        let update = match catalog.get(alias) {
            Some(existing) => {
                let merged = ServerConfig {
                    key_path: server.key_path.or_else(|| existing.key_path.clone()),
                    password: server.password.or_else(|| existing.password.clone()),
                    ..server
                };
                catalog.insert(alias.to_string(), merged);
                CatalogUpdate::Updated
            }
            None => {
                catalog.insert(alias.to_string(), server);
                CatalogUpdate::Added
            }
        };
        write_json(&self.path, &catalog).await?;
        info!(alias = %alias, update = ?update, "Server catalog updated");
        Ok(update)
    }

    async fn remove(&self, alias: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.load().await?;
        if catalog.remove(alias).is_none() {
            return Err(AppError::UnknownAlias(alias.to_string()));
        }
        write_json(&self.path, &catalog).await?;
        info!(alias = %alias, "Server removed from catalog");
        Ok(())
    }

    async fn list(&self) -> Result<BTreeMap<String, ServerConfig>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|(alias, server)| (alias, server.redacted()))
            .collect())
    }
}
