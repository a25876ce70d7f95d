// Alias Resolution Port
// Maps a server alias to its connection parameters; the catalog also edits the mapping

use crate::domain::ServerConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait AliasResolver: Send + Sync {
    /// Resolve an alias
    ///
    /// # Errors
    /// - AppError::UnknownAlias if the alias is not in the catalog
    async fn resolve(&self, alias: &str) -> Result<ServerConfig>;
}

/// Whether `ServerCatalog::add` created a new entry or merged into an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogUpdate {
    Added,
    Updated,
}

/// Editable alias catalog behind the `server_*` tools
#[async_trait]
pub trait ServerCatalog: AliasResolver {
    /// Add an alias, or merge the given fields into an existing one
    async fn add(&self, alias: &str, server: ServerConfig) -> Result<CatalogUpdate>;

    /// # Errors
    /// - AppError::UnknownAlias when the alias is not in the catalog
    async fn remove(&self, alias: &str) -> Result<()>;

    /// All entries, passwords redacted
    async fn list(&self) -> Result<BTreeMap<String, ServerConfig>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory alias table
    #[derive(Default)]
    pub struct StaticAliasResolver {
        servers: Mutex<BTreeMap<String, ServerConfig>>,
    }

    impl StaticAliasResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, alias: impl Into<String>, server: ServerConfig) -> Self {
            self.servers
                .lock()
                .unwrap()
                .insert(alias.into(), server);
            self
        }
    }

    #[async_trait]
    impl AliasResolver for StaticAliasResolver {
        async fn resolve(&self, alias: &str) -> Result<ServerConfig> {
            self.servers
                .lock()
                .unwrap()
                .get(alias)
                .cloned()
                .ok_or_else(|| AppError::UnknownAlias(alias.to_string()))
        }
    }

    #[async_trait]
    impl ServerCatalog for StaticAliasResolver {
        async fn add(&self, alias: &str, server: ServerConfig) -> Result<CatalogUpdate> {
            let previous = self.servers.lock().unwrap().insert(alias.to_string(), server);
            Ok(match previous {
                Some(_) => CatalogUpdate::Updated,
                None => CatalogUpdate::Added,
            })
        }

        async fn remove(&self, alias: &str) -> Result<()> {
            self.servers
                .lock()
                .unwrap()
                .remove(alias)
                .map(|_| ())
                .ok_or_else(|| AppError::UnknownAlias(alias.to_string()))
        }

        async fn list(&self) -> Result<BTreeMap<String, ServerConfig>> {
            Ok(self
                .servers
                .lock()
                .unwrap()
                .iter()
                .map(|(alias, server)| (alias.clone(), server.redacted()))
                .collect())
        }
    }
}
