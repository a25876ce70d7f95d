// Remote Transport Port
// Sessions, exec/shell channels and SFTP over an authenticated connection

use crate::domain::ServerConfig;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("cannot load private key: {0}")]
    Key(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("sftp error: {0}")]
    Sftp(String),

    #[error("local io error: {0}")]
    Io(String),

    #[error("session closed")]
    Closed,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Session establishment parameters
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

/// Something that happened on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(String),
    Stderr(String),
    Exit(i32),
    /// The remote process was killed by this signal (`TERM`, `KILL`, ...)
    Signal(String),
}

/// A running exec or shell channel
#[async_trait]
pub trait RemoteChannel: Send {
    /// Next event, `None` once the channel is closed
    ///
    /// Must be cancel-safe: executors race it against timers.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Write to the remote stdin
    async fn write(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Send an interrupt (Ctrl+C) to the remote process
    async fn interrupt(&mut self) -> TransportResult<()>;

    async fn close(&mut self) -> TransportResult<()>;
}

/// Directory entry returned by `SftpClient::list_dir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// File operations over an SFTP subsystem channel
#[async_trait]
pub trait SftpClient: Send + Sync {
    async fn exists(&self, path: &str) -> TransportResult<bool>;

    async fn is_dir(&self, path: &str) -> TransportResult<bool>;

    /// Entries of a remote directory, without `.` and `..`
    async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>>;

    /// Create a remote directory and its missing ancestors
    async fn mkdir_all(&self, path: &str) -> TransportResult<()>;

    /// Returns the number of bytes written
    async fn upload_file(&self, local: &Path, remote: &str) -> TransportResult<u64>;

    /// Returns the number of bytes written
    async fn download_file(&self, remote: &str, local: &Path) -> TransportResult<u64>;

    async fn close(&self) -> TransportResult<()>;
}

/// One authenticated connection
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Whether the underlying connection is still usable
    fn is_healthy(&self) -> bool;

    async fn exec(&self, command: &str, pty: bool) -> TransportResult<Box<dyn RemoteChannel>>;

    /// Interactive shell with a pseudo-terminal
    async fn shell(&self) -> TransportResult<Box<dyn RemoteChannel>>;

    async fn sftp(&self) -> TransportResult<Box<dyn SftpClient>>;

    async fn close(&self) -> TransportResult<()>;
}

/// Opens sessions to catalog servers
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(
        &self,
        server: &ServerConfig,
        options: &ConnectOptions,
    ) -> TransportResult<Arc<dyn RemoteSession>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted reaction to one command
    #[derive(Debug, Clone, Default)]
    pub struct MockReply {
        pub stdout: String,
        pub stderr: String,
        /// `None` closes the channel without an exit status
        pub exit_code: Option<i32>,
        /// Exec only: reported as the signal that killed the command
        pub signal: Option<String>,
        /// Keep the channel open after the output until interrupted
        pub hang: bool,
        /// Shell only: text printed after the command, waiting for a response
        pub prompt: Option<String>,
        /// Shell only: close the channel right after the command
        pub close_early: bool,
    }

    impl MockReply {
        pub fn ok(stdout: impl Into<String>) -> Self {
            Self {
                stdout: stdout.into(),
                exit_code: Some(0),
                ..Default::default()
            }
        }

        pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
            Self {
                stderr: stderr.into(),
                exit_code: Some(code),
                ..Default::default()
            }
        }

        pub fn killed(signal: impl Into<String>) -> Self {
            Self {
                signal: Some(signal.into()),
                ..Default::default()
            }
        }

        pub fn hanging(stdout: impl Into<String>) -> Self {
            Self {
                stdout: stdout.into(),
                hang: true,
                ..Default::default()
            }
        }

        pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
            self.prompt = Some(prompt.into());
            self
        }
    }

    /// In-memory remote filesystem shared by all mock SFTP channels
    #[derive(Debug, Default)]
    pub struct MockRemoteFs {
        pub files: BTreeMap<String, Vec<u8>>,
        pub dirs: BTreeSet<String>,
        /// File names whose transfer fails
        pub failing: HashSet<String>,
    }

    #[derive(Default)]
    struct MockState {
        replies: Mutex<HashMap<String, MockReply>>,
        executed: Mutex<Vec<String>>,
        writes: Mutex<Vec<String>>,
        sessions: Mutex<Vec<Arc<MockSession>>>,
        fs: Mutex<MockRemoteFs>,
        connect_failures: AtomicU32,
        connect_attempts: AtomicUsize,
        connect_delay_ms: AtomicUsize,
    }

    fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn parent_of(path: &str) -> String {
        match path.trim_end_matches('/').rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        }
    }

    fn name_of(path: &str) -> &str {
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(path)
    }

    /// Scripted transport: commands answer from a reply table, SFTP hits `MockRemoteFs`
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<MockState>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            let transport = Self::default();
            lock(&transport.state.fs).dirs.insert("/".to_string());
            transport
        }

        pub fn reply(&self, command: impl Into<String>, reply: MockReply) -> &Self {
            lock(&self.state.replies).insert(command.into(), reply);
            self
        }

        /// The next `n` connect attempts fail
        pub fn fail_connects(&self, n: u32) {
            self.state.connect_failures.store(n, Ordering::SeqCst);
        }

        pub fn set_connect_delay_ms(&self, ms: usize) {
            self.state.connect_delay_ms.store(ms, Ordering::SeqCst);
        }

        pub fn connect_attempts(&self) -> usize {
            self.state.connect_attempts.load(Ordering::SeqCst)
        }

        /// Commands run through exec or typed into a shell, in order
        pub fn executed(&self) -> Vec<String> {
            lock(&self.state.executed).clone()
        }

        /// Everything written to channel stdin after the command itself
        pub fn writes(&self) -> Vec<String> {
            lock(&self.state.writes).clone()
        }

        pub fn sessions(&self) -> Vec<Arc<MockSession>> {
            lock(&self.state.sessions).clone()
        }

        pub fn fail_transfer_of(&self, file_name: impl Into<String>) {
            lock(&self.state.fs).failing.insert(file_name.into());
        }

        pub fn add_remote_file(&self, path: &str, content: &[u8]) {
            let mut fs = lock(&self.state.fs);
            let mut dir = parent_of(path);
            loop {
                fs.dirs.insert(dir.clone());
                if dir == "/" {
                    break;
                }
                dir = parent_of(&dir);
            }
            fs.files.insert(path.to_string(), content.to_vec());
        }

        pub fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
            lock(&self.state.fs).files.get(path).cloned()
        }

        pub fn remote_files(&self) -> Vec<String> {
            lock(&self.state.fs).files.keys().cloned().collect()
        }

        fn reply_for(&self, command: &str) -> MockReply {
            if let Some(reply) = lock(&self.state.replies).get(command) {
                return reply.clone();
            }
            match command.strip_prefix("echo ") {
                Some(rest) => MockReply::ok(format!("{}\n", rest.trim_matches('\''))),
                None => MockReply::ok(""),
            }
        }
    }

    #[async_trait]
    impl RemoteTransport for MockTransport {
        async fn connect(
            &self,
            server: &ServerConfig,
            _options: &ConnectOptions,
        ) -> TransportResult<Arc<dyn RemoteSession>> {
            self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            let remaining = self.state.connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.state
                    .connect_failures
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::Connect(format!(
                    "{}:{} refused",
                    server.host, server.port
                )));
            }
            let session = Arc::new(MockSession {
                transport: self.clone(),
                healthy: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            });
            lock(&self.state.sessions).push(session.clone());
            Ok(session)
        }
    }

    pub struct MockSession {
        transport: MockTransport,
        healthy: AtomicBool,
        closed: AtomicBool,
    }

    impl MockSession {
        /// Simulate a dropped connection
        pub fn break_connection(&self) {
            self.healthy.store(false, Ordering::SeqCst);
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSession for MockSession {
        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
        }

        async fn exec(&self, command: &str, _pty: bool) -> TransportResult<Box<dyn RemoteChannel>> {
            if !self.is_healthy() {
                return Err(TransportError::Closed);
            }
            lock(&self.transport.state.executed).push(command.to_string());
            let reply = self.transport.reply_for(command);

            let mut events = VecDeque::new();
            if !reply.stdout.is_empty() {
                events.push_back(ChannelEvent::Stdout(reply.stdout.clone()));
            }
            if !reply.stderr.is_empty() {
                events.push_back(ChannelEvent::Stderr(reply.stderr.clone()));
            }
            if let (Some(code), false) = (reply.exit_code, reply.hang) {
                events.push_back(ChannelEvent::Exit(code));
            }
            if let Some(signal) = reply.signal.clone() {
                events.push_back(ChannelEvent::Signal(signal));
            }
            Ok(Box::new(MockChannel {
                transport: self.transport.clone(),
                events,
                open: reply.hang,
                interrupted: false,
            }))
        }

        async fn shell(&self) -> TransportResult<Box<dyn RemoteChannel>> {
            if !self.is_healthy() {
                return Err(TransportError::Closed);
            }
            Ok(Box::new(MockShell {
                transport: self.transport.clone(),
                events: VecDeque::new(),
                command_seen: false,
                pending: None,
                closing: false,
            }))
        }

        async fn sftp(&self) -> TransportResult<Box<dyn SftpClient>> {
            if !self.is_healthy() {
                return Err(TransportError::Closed);
            }
            Ok(Box::new(MockSftp {
                transport: self.transport.clone(),
            }))
        }

        async fn close(&self) -> TransportResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Exec channel replaying a scripted reply
    struct MockChannel {
        transport: MockTransport,
        events: VecDeque<ChannelEvent>,
        open: bool,
        interrupted: bool,
    }

    #[async_trait]
    impl RemoteChannel for MockChannel {
        async fn next_event(&mut self) -> Option<ChannelEvent> {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.open && !self.interrupted {
                std::future::pending::<()>().await;
            }
            None
        }

        async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
            lock(&self.transport.state.writes).push(String::from_utf8_lossy(data).into_owned());
            Ok(())
        }

        async fn interrupt(&mut self) -> TransportResult<()> {
            self.interrupted = true;
            Ok(())
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.open = false;
            self.events.clear();
            Ok(())
        }
    }

    /// Shell channel that echoes input like a terminal and runs `printf` markers
    struct MockShell {
        transport: MockTransport,
        events: VecDeque<ChannelEvent>,
        command_seen: bool,
        pending: Option<MockReply>,
        closing: bool,
    }

    impl MockShell {
        fn printf_output(line: &str) -> Option<String> {
            let rest = line.trim().strip_prefix("printf '%s%s\\n' ")?;
            let parts: Vec<&str> = rest.split('\'').collect();
            // ["", first, " ", second, "; exit"]
            if parts.len() < 4 {
                return None;
            }
            Some(format!("{}{}\n", parts[1], parts[3]))
        }
    }

    #[async_trait]
    impl RemoteChannel for MockShell {
        async fn next_event(&mut self) -> Option<ChannelEvent> {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if !self.closing {
                std::future::pending::<()>().await;
            }
            None
        }

        async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
            let text = String::from_utf8_lossy(data).into_owned();
            self.events.push_back(ChannelEvent::Stdout(text.clone()));

            if !self.command_seen {
                self.command_seen = true;
                let command = text.trim_end().to_string();
                lock(&self.transport.state.executed).push(command.clone());
                let reply = self.transport.reply_for(&command);
                if reply.close_early {
                    self.closing = true;
                    self.events.clear();
                    return Ok(());
                }
                match &reply.prompt {
                    Some(prompt) => {
                        self.events.push_back(ChannelEvent::Stdout(prompt.clone()));
                        self.pending = Some(reply);
                    }
                    None => {
                        self.events.push_back(ChannelEvent::Stdout(reply.stdout.clone()));
                    }
                }
                return Ok(());
            }

            lock(&self.transport.state.writes).push(text.clone());
            // a waiting prompt reads the next line, whatever it is
            if let Some(reply) = self.pending.take() {
                self.events.push_back(ChannelEvent::Stdout(reply.stdout));
            } else if let Some(output) = Self::printf_output(&text) {
                self.events.push_back(ChannelEvent::Stdout(output));
                if text.contains("exit") {
                    self.closing = true;
                }
            }
            Ok(())
        }

        async fn interrupt(&mut self) -> TransportResult<()> {
            self.closing = true;
            Ok(())
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.closing = true;
            self.events.clear();
            Ok(())
        }
    }

    struct MockSftp {
        transport: MockTransport,
    }

    #[async_trait]
    impl SftpClient for MockSftp {
        async fn exists(&self, path: &str) -> TransportResult<bool> {
            let fs = lock(&self.transport.state.fs);
            Ok(fs.files.contains_key(path) || fs.dirs.contains(path))
        }

        async fn is_dir(&self, path: &str) -> TransportResult<bool> {
            Ok(lock(&self.transport.state.fs).dirs.contains(path))
        }

        async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>> {
            let fs = lock(&self.transport.state.fs);
            if !fs.dirs.contains(path) {
                return Err(TransportError::Sftp(format!("no such directory: {}", path)));
            }
            let files = fs.files.keys().filter(|f| parent_of(f) == path).map(|f| RemoteEntry {
                name: name_of(f).to_string(),
                is_dir: false,
            });
            let dirs = fs
                .dirs
                .iter()
                .filter(|d| d.as_str() != "/" && parent_of(d) == path)
                .map(|d| RemoteEntry {
                    name: name_of(d).to_string(),
                    is_dir: true,
                });
            Ok(files.chain(dirs).collect())
        }

        async fn mkdir_all(&self, path: &str) -> TransportResult<()> {
            let mut fs = lock(&self.transport.state.fs);
            let mut dir = path.trim_end_matches('/').to_string();
            if dir.is_empty() {
                return Ok(());
            }
            loop {
                fs.dirs.insert(dir.clone());
                if dir == "/" {
                    break;
                }
                dir = parent_of(&dir);
            }
            Ok(())
        }

        async fn upload_file(&self, local: &Path, remote: &str) -> TransportResult<u64> {
            let content = tokio::fs::read(local)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            let mut fs = lock(&self.transport.state.fs);
            let local_name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if fs.failing.contains(&local_name) {
                return Err(TransportError::Sftp(format!("permission denied: {}", remote)));
            }
            if !fs.dirs.contains(&parent_of(remote)) {
                return Err(TransportError::Sftp(format!("no such file: {}", remote)));
            }
            let len = content.len() as u64;
            fs.files.insert(remote.to_string(), content);
            Ok(len)
        }

        async fn download_file(&self, remote: &str, local: &Path) -> TransportResult<u64> {
            let content = {
                let fs = lock(&self.transport.state.fs);
                if fs.failing.contains(name_of(remote)) {
                    return Err(TransportError::Sftp(format!("permission denied: {}", remote)));
                }
                fs.files
                    .get(remote)
                    .cloned()
                    .ok_or_else(|| TransportError::Sftp(format!("no such file: {}", remote)))?
            };
            tokio::fs::write(local, &content)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            Ok(content.len() as u64)
        }

        async fn close(&self) -> TransportResult<()> {
            Ok(())
        }
    }

    /// Transport whose every connect fails
    pub struct UnreachableTransport;

    #[async_trait]
    impl RemoteTransport for UnreachableTransport {
        async fn connect(
            &self,
            server: &ServerConfig,
            _options: &ConnectOptions,
        ) -> TransportResult<Arc<dyn RemoteSession>> {
            Err(TransportError::Connect(format!("{} unreachable", server.host)))
        }
    }
}
