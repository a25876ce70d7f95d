// Connection Pool Manager
// Per-alias pool of long-lived sessions with lease/release, bounded waits and idle reaping

use crate::application::constants::CONNECTION_SUFFIX_LEN;
use crate::application::queue::DiagnosticLog;
use crate::application::retry::{BackoffPolicy, RetryDecision};
use crate::config::PoolConfig;
use crate::domain::ServerConfig;
use crate::error::{AppError, Result};
use crate::port::{ConnectOptions, RemoteSession, RemoteTransport, TimeProvider, TransportError};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

struct Entry {
    alias: String,
    session: Arc<dyn RemoteSession>,
    in_use: bool,
    last_used: i64,
}

#[derive(Default)]
struct PoolState {
    /// alias -> connection ids in creation order
    pools: HashMap<String, Vec<String>>,
    registry: HashMap<String, Entry>,
    /// alias -> connections currently being opened
    creating: HashMap<String, usize>,
}

impl PoolState {
    fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.registry.remove(id)?;
        if let Some(ids) = self.pools.get_mut(&entry.alias) {
            ids.retain(|c| c != id);
            if ids.is_empty() {
                self.pools.remove(&entry.alias);
            }
        }
        Some(entry)
    }
}

enum Acquire {
    Leased(String, Arc<dyn RemoteSession>),
    Create,
    Full,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub in_use: bool,
    pub ready: bool,
    pub last_used: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasPoolStats {
    pub total: usize,
    pub in_use: usize,
    pub available: usize,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_connections: usize,
    pub by_alias: BTreeMap<String, AliasPoolStats>,
}

pub struct ConnectionPool {
    state: Mutex<PoolState>,
    released: Notify,
    transport: Arc<dyn RemoteTransport>,
    time_provider: Arc<dyn TimeProvider>,
    log: Arc<DiagnosticLog>,
    backoff: BackoffPolicy,
    config: PoolConfig,
}

impl ConnectionPool {
    pub fn new(
        config: PoolConfig,
        transport: Arc<dyn RemoteTransport>,
        time_provider: Arc<dyn TimeProvider>,
        log: Arc<DiagnosticLog>,
    ) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            released: Notify::new(),
            transport,
            time_provider,
            log,
            backoff: BackoffPolicy::new(config.connect_retries, config.retry_backoff),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease a connection for `alias`, creating one if the pool has room
    ///
    /// Waits for a release when the pool is saturated, up to the acquire timeout.
    ///
    /// # Errors
    /// - AppError::PoolTimeout if nothing frees up in time
    /// - AppError::AuthMissing / AppError::Connection from session creation
    pub async fn get_connection(
        self: &Arc<Self>,
        alias: &str,
        server: &ServerConfig,
    ) -> Result<PooledConnection> {
        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout;
        let mut warned = false;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (decision, purged) = self.try_acquire(alias);
            close_sessions(purged).await;

            match decision {
                Acquire::Leased(id, session) => {
                    self.log
                        .debug(format!("Reusing connection {} for {}", id, alias));
                    return Ok(self.lease(id, alias, session));
                }
                Acquire::Create => {
                    let slot = CreatingSlot {
                        pool: self,
                        alias: alias.to_string(),
                        armed: true,
                    };
                    return self.create_connection(slot, server).await;
                }
                Acquire::Full => {}
            }

            if !warned {
                self.log
                    .warn(format!("Connection pool saturated for {}, waiting", alias));
                warned = true;
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                self.log.error(format!(
                    "Timed out after {}ms waiting for a connection to {}",
                    waited_ms, alias
                ));
                return Err(AppError::PoolTimeout {
                    alias: alias.to_string(),
                    waited_ms,
                });
            }
            let wait = self.config.poll_interval.min(deadline - now);
            tokio::select! {
                _ = &mut notified => {}
                _ = sleep(wait) => {}
            }
        }
    }

    /// Lease a free healthy connection, reserve a creation slot, or report saturation
    fn try_acquire(&self, alias: &str) -> (Acquire, Vec<Arc<dyn RemoteSession>>) {
        let now = self.time_provider.now_millis();
        let mut state = self.lock();
        let mut purged = Vec::new();

        let ids = state.pools.get(alias).cloned().unwrap_or_default();
        for id in ids {
            let Some(entry) = state.registry.get_mut(&id) else {
                continue;
            };
            if entry.in_use {
                continue;
            }
            if entry.session.is_healthy() {
                entry.in_use = true;
                entry.last_used = now;
                return (Acquire::Leased(id, entry.session.clone()), purged);
            }
            if let Some(dead) = state.remove(&id) {
                debug!(connection_id = %id, "Purging dead pooled connection");
                purged.push(dead.session);
            }
        }

        let total = state.pools.get(alias).map_or(0, Vec::len);
        let creating = state.creating.get(alias).copied().unwrap_or(0);
        if total + creating < self.config.max_connections {
            *state.creating.entry(alias.to_string()).or_default() += 1;
            (Acquire::Create, purged)
        } else {
            (Acquire::Full, purged)
        }
    }

    fn lease(
        self: &Arc<Self>,
        id: String,
        alias: &str,
        session: Arc<dyn RemoteSession>,
    ) -> PooledConnection {
        PooledConnection {
            id,
            alias: alias.to_string(),
            session,
            pool: Arc::clone(self),
        }
    }

    /// Open a session into a reserved slot, retrying transport failures with linear backoff
    async fn create_connection(
        self: &Arc<Self>,
        mut slot: CreatingSlot<'_>,
        server: &ServerConfig,
    ) -> Result<PooledConnection> {
        let alias = slot.alias.clone();
        if server.auth_method().is_none() {
            self.log
                .error(format!("No authentication configured for {}", alias));
            return Err(AppError::AuthMissing(alias));
        }

        let options = ConnectOptions {
            connect_timeout: self.config.connect_timeout,
            keepalive_interval: self.config.keepalive_interval,
        };

        let mut attempt = 0u32;
        let session = loop {
            attempt += 1;
            let error = match timeout(
                self.config.connect_timeout,
                self.transport.connect(server, &options),
            )
            .await
            {
                Ok(Ok(session)) => break session,
                Ok(Err(e)) => e,
                Err(_) => TransportError::Connect(format!(
                    "timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                )),
            };

            match self.backoff.should_retry(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    self.log.warn(format!(
                        "Connection attempt {}/{} to {} failed: {}",
                        attempt, self.config.connect_retries, alias, error
                    ));
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    self.log
                        .error(format!("Cannot connect to {}: {}", alias, error));
                    return Err(AppError::Connection(format!(
                        "cannot connect to {}: {}",
                        alias, error
                    )));
                }
            }
        };

        let id = connection_id(&alias, self.time_provider.now_millis());
        {
            let mut state = self.lock();
            state.registry.insert(
                id.clone(),
                Entry {
                    alias: alias.clone(),
                    session: session.clone(),
                    in_use: true,
                    last_used: self.time_provider.now_millis(),
                },
            );
            state
                .pools
                .entry(alias.clone())
                .or_default()
                .push(id.clone());
            slot.complete(&mut state);
        }

        info!(connection_id = %id, alias = %alias, host = %server.host, "Session established");
        self.log
            .info(format!("New connection {} established for {}", id, alias));
        Ok(self.lease(id, &alias, session))
    }

    /// Return a leased connection to the pool; the session stays open
    pub fn release_connection(&self, id: &str) {
        let now = self.time_provider.now_millis();
        let released = {
            let mut state = self.lock();
            match state.registry.get_mut(id) {
                Some(entry) => {
                    entry.in_use = false;
                    entry.last_used = now;
                    true
                }
                None => false,
            }
        };
        if released {
            self.log.debug(format!("Connection {} released", id));
        }
        self.released.notify_waiters();
    }

    /// Close free connections idle past the timeout, keeping `min_connections` per alias;
    /// also drops free connections whose transport died. Returns how many were removed.
    pub async fn reap_idle(&self) -> usize {
        let now = self.time_provider.now_millis();
        let idle_ms = self.config.idle_timeout.as_millis() as i64;
        let mut closed = Vec::new();
        let mut idle_ids = Vec::new();

        {
            let mut state = self.lock();
            let ids: Vec<String> = state.registry.keys().cloned().collect();
            for id in ids {
                let Some(entry) = state.registry.get(&id) else {
                    continue;
                };
                if entry.in_use {
                    continue;
                }
                let alias_total = state.pools.get(&entry.alias).map_or(0, Vec::len);
                let idle = now - entry.last_used > idle_ms;
                let dead = !entry.session.is_healthy();

                if (idle && alias_total > self.config.min_connections) || dead {
                    if let Some(entry) = state.remove(&id) {
                        if idle && !dead {
                            idle_ids.push(id.clone());
                        }
                        closed.push(entry.session);
                    }
                }
            }
        }

        for id in &idle_ids {
            self.log
                .info(format!("Closing idle connection {}", id));
        }
        let count = closed.len();
        close_sessions(closed).await;
        count
    }

    /// Close every tracked connection (shutdown)
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<dyn RemoteSession>> = {
            let mut state = self.lock();
            state.pools.clear();
            state.registry.drain().map(|(_, e)| e.session).collect()
        };
        self.log
            .info(format!("Closing all {} connections", sessions.len()));
        close_sessions(sessions).await;
        self.released.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        let mut by_alias = BTreeMap::new();
        for (alias, ids) in &state.pools {
            let connections: Vec<ConnectionInfo> = ids
                .iter()
                .filter_map(|id| {
                    state.registry.get(id).map(|e| ConnectionInfo {
                        id: id.clone(),
                        in_use: e.in_use,
                        ready: e.session.is_healthy(),
                        last_used: e.last_used,
                    })
                })
                .collect();
            by_alias.insert(
                alias.clone(),
                AliasPoolStats {
                    total: connections.len(),
                    in_use: connections.iter().filter(|c| c.in_use).count(),
                    available: connections.iter().filter(|c| !c.in_use && c.ready).count(),
                    connections,
                },
            );
        }
        PoolStats {
            total_connections: state.registry.len(),
            by_alias,
        }
    }
}

/// Reservation of one creation slot; released on drop unless the connection got registered
struct CreatingSlot<'a> {
    pool: &'a ConnectionPool,
    alias: String,
    armed: bool,
}

impl CreatingSlot<'_> {
    fn complete(&mut self, state: &mut PoolState) {
        decrement(state, &self.alias);
        self.armed = false;
    }
}

impl Drop for CreatingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            decrement(&mut self.pool.lock(), &self.alias);
            self.pool.released.notify_waiters();
        }
    }
}

fn decrement(state: &mut PoolState, alias: &str) {
    if let Some(n) = state.creating.get_mut(alias) {
        *n = n.saturating_sub(1);
        if *n == 0 {
            state.creating.remove(alias);
        }
    }
}

async fn close_sessions(sessions: Vec<Arc<dyn RemoteSession>>) {
    for session in sessions {
        if let Err(e) = session.close().await {
            warn!(error = %e, "Error while closing session");
        }
    }
}

/// `{alias}_{epoch_ms}_{9 lowercase alphanumerics}`
fn connection_id(alias: &str, now_millis: i64) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CONNECTION_SUFFIX_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}_{}_{}", alias, now_millis, suffix)
}

/// Lease guard: the connection goes back to the pool when this drops
pub struct PooledConnection {
    id: String,
    alias: String,
    session: Arc<dyn RemoteSession>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn session(&self) -> &Arc<dyn RemoteSession> {
        &self.session
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.release_connection(&self.id);
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .finish()
    }
}
