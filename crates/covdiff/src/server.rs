//! Control Server
//!
//! Accepts one connection per control command on a Unix socket, reads a
//! single line, applies it to the [`SessionMachine`], answers `ACK` and
//! closes. Connections are served concurrently; the machine's lock
//! serializes their effect.
//!
//! [`CoverageAgent::spawn`] runs the server on a dedicated thread with a
//! single-threaded tokio runtime, so the agent never borrows application
//! threads and never starts threads per request.

use crate::config::AgentConfig;
use crate::coverage::{ExecutionRecorder, LineRecorder};
use crate::emitter::ReportSink;
use crate::protocol::{ACK, MAX_COMMAND_LEN};
use crate::result::{AgentError, AgentResult};
use crate::session::SessionMachine;
use crate::threads::{ProcessThreads, ThreadRegistry};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Default bound on reading a control line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the agent's background thread
pub const AGENT_THREAD_NAME: &str = "covdiff-control";

// =============================================================================
// CONTROL SERVER
// =============================================================================

/// Accept loop for the control socket
#[derive(Debug, Clone)]
pub struct ControlServer {
    machine: Arc<SessionMachine>,
    read_timeout: Duration,
}

impl ControlServer {
    /// Create a server driving `machine`
    #[must_use]
    pub fn new(machine: Arc<SessionMachine>) -> Self {
        Self {
            machine,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Bound the time a client may take to send its line
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bind the control socket, replacing a stale socket file
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: &Path) -> AgentResult<UnixListener> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| AgentError::bind(path, e))?;
            }
        }
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| AgentError::bind(path, e))?;
        }
        UnixListener::bind(path).map_err(|e| AgentError::bind(path, e))
    }

    /// Serve connections until `shutdown` flips to `true`
    pub async fn serve(self, listener: UnixListener, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("control server accepting connections");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, _addr)) => {
                            let server = self.clone();
                            let _ = tokio::spawn(async move {
                                server.handle_connection(stream).await;
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "control accept failed");
                        }
                    }
                }
            }
        }
        tracing::info!("control server stopped");
    }

    async fn handle_connection(&self, mut stream: UnixStream) {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half).take(MAX_COMMAND_LEN as u64);
        let mut line = String::new();

        match tokio::time::timeout(self.read_timeout, reader.read_line(&mut line)).await {
            Ok(Ok(read)) if read >= MAX_COMMAND_LEN && !line.ends_with('\n') => {
                tracing::warn!(
                    limit = MAX_COMMAND_LEN,
                    "control command exceeds length limit, ignored"
                );
            }
            Ok(Ok(_)) => {
                let _ = self.machine.handle_line(&line).await;
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to read control command");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "control client sent no command in time"
                );
            }
        }

        let ack = format!("{ACK}\n");
        if let Err(err) = write_half.write_all(ack.as_bytes()).await {
            tracing::debug!(error = %err, "control client left before ACK");
            return;
        }
        let _ = write_half.shutdown().await;
    }
}

// =============================================================================
// AGENT LIFECYCLE
// =============================================================================

/// Builder for the always-on agent service
#[derive(Debug)]
pub struct CoverageAgent {
    config: AgentConfig,
    recorder: Arc<dyn ExecutionRecorder>,
    threads: Arc<dyn ThreadRegistry>,
    sinks: Option<Vec<Box<dyn ReportSink>>>,
}

impl CoverageAgent {
    /// Agent over the process-wide recorder and the OS thread list
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            recorder: LineRecorder::global(),
            threads: Arc::new(ProcessThreads),
            sinks: None,
        }
    }

    /// Use a specific recorder
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Use a specific thread registry
    #[must_use]
    pub fn with_threads(mut self, threads: Arc<dyn ThreadRegistry>) -> Self {
        self.threads = threads;
        self
    }

    /// Replace the configured report sinks
    #[must_use]
    pub fn with_sinks(mut self, sinks: Vec<Box<dyn ReportSink>>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Start the control server on its own thread
    ///
    /// Returns once the control socket is bound. A bind failure is returned
    /// as an error; nothing panics and the calling thread is never blocked
    /// beyond the bind itself.
    pub fn spawn(self) -> AgentResult<AgentHandle> {
        let Self {
            config,
            recorder,
            threads,
            sinks,
        } = self;
        let machine = Arc::new(match sinks {
            Some(sinks) => SessionMachine::with_sinks(&config, recorder, threads, sinks),
            None => SessionMachine::new(&config, recorder, threads),
        });
        let control_socket = config.control_socket.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<AgentResult<()>>(1);

        let server = ControlServer::new(Arc::clone(&machine));
        let socket = control_socket.clone();
        let thread = std::thread::Builder::new()
            .name(AGENT_THREAD_NAME.to_string())
            .spawn(move || run_agent_thread(server, &socket, shutdown_rx, &ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(
                    control = %control_socket.display(),
                    data = %config.data_socket.display(),
                    app_root = %config.app_root.display(),
                    "coverage agent ready"
                );
                Ok(AgentHandle {
                    machine,
                    control_socket,
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                })
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                tracing::error!(error = %err, "coverage agent failed to start");
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AgentError::runtime("agent thread exited before binding"))
            }
        }
    }
}

fn run_agent_thread(
    server: ControlServer,
    socket: &Path,
    shutdown: watch::Receiver<bool>,
    ready: &mpsc::SyncSender<AgentResult<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(AgentError::runtime(format!(
                "failed to build agent runtime: {err}"
            ))));
            return;
        }
    };

    runtime.block_on(async {
        let listener = match ControlServer::bind(socket) {
            Ok(listener) => listener,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        server.serve(listener, shutdown).await;
    });

    if let Err(err) = std::fs::remove_file(socket) {
        tracing::debug!(error = %err, socket = %socket.display(), "control socket already gone");
    }
}

/// Running agent; stops the server when shut down or dropped
#[derive(Debug)]
pub struct AgentHandle {
    machine: Arc<SessionMachine>,
    control_socket: PathBuf,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl AgentHandle {
    /// Control socket the agent listens on
    #[must_use]
    pub fn control_socket(&self) -> &Path {
        &self.control_socket
    }

    /// The state machine behind the control socket
    #[must_use]
    pub fn machine(&self) -> &Arc<SessionMachine> {
        &self.machine
    }

    /// Stop accepting commands, join the agent thread and remove the socket
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("coverage agent thread panicked");
            }
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use crate::threads::ThreadTracker;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt as _;

    fn config(dir: &TempDir) -> AgentConfig {
        AgentConfig::builder()
            .app_root(dir.path())
            .control_socket(dir.path().join("control.sock"))
            .data_socket(dir.path().join("data.sock"))
            .stabilize(20, 5)
            .quiesce(20, 2)
            .settle_ms(0)
            .build()
            .unwrap()
    }

    async fn send_raw(path: &Path, payload: &[u8]) -> String {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut reply = String::new();
        let _ = stream.read_to_string(&mut reply).await.unwrap();
        reply
    }

    fn agent(dir: &TempDir) -> AgentHandle {
        CoverageAgent::new(config(dir))
            .with_recorder(Arc::new(LineRecorder::new()))
            .with_threads(Arc::new(ThreadTracker::new()))
            .with_sinks(Vec::new())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_every_request_is_acknowledged() {
        let dir = TempDir::new().unwrap();
        let handle = agent(&dir);
        let socket = handle.control_socket().to_path_buf();

        assert_eq!(send_raw(&socket, b"START t1\n").await, "ACK\n");
        assert_eq!(send_raw(&socket, b"garbage\n").await, "ACK\n");
        assert_eq!(send_raw(&socket, b"\n").await, "ACK\n");
        assert_eq!(send_raw(&socket, b"END t1\n").await, "ACK\n");
        assert_eq!(handle.machine().phase().await, SessionPhase::Idle);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("control.sock"), b"stale").unwrap();
        let handle = agent(&dir);
        assert_eq!(send_raw(handle.control_socket(), b"START t1\n").await, "ACK\n");
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let dir = TempDir::new().unwrap();
        let handle = agent(&dir);
        let socket = handle.control_socket().to_path_buf();
        assert!(socket.exists());
        handle.shutdown();
        assert!(!socket.exists());
    }

    #[test]
    fn test_bind_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let config = AgentConfig::builder()
            .control_socket(blocker.join("control.sock"))
            .data_socket(dir.path().join("data.sock"))
            .build()
            .unwrap();
        let result = CoverageAgent::new(config)
            .with_recorder(Arc::new(LineRecorder::new()))
            .spawn();
        assert!(matches!(result, Err(AgentError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_overlong_command_is_ignored_but_acknowledged() {
        let dir = TempDir::new().unwrap();
        let handle = agent(&dir);
        let socket = handle.control_socket().to_path_buf();

        let mut payload = format!("START {}-tail\n", "a".repeat(MAX_COMMAND_LEN + 1_000));
        let mut stream = UnixStream::connect(&socket).await.unwrap();
        stream.write_all(payload.as_bytes()).await.unwrap();
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ACK\n");
        assert_eq!(handle.machine().active_session().await, None);

        // A command that fits exactly is still accepted
        payload = format!("START {}\n", "b".repeat(MAX_COMMAND_LEN - 7));
        assert_eq!(payload.len(), MAX_COMMAND_LEN);
        assert_eq!(send_raw(&socket, payload.as_bytes()).await, "ACK\n");
        assert_eq!(
            handle.machine().active_session().await,
            Some("b".repeat(MAX_COMMAND_LEN - 7))
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_silent_client_still_gets_ack_after_timeout() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let machine = Arc::new(SessionMachine::with_sinks(
            &cfg,
            Arc::new(LineRecorder::new()),
            Arc::new(ThreadTracker::new()),
            Vec::new(),
        ));
        let listener = ControlServer::bind(&cfg.control_socket).unwrap();
        let (tx, rx) = watch::channel(false);
        let server = ControlServer::new(Arc::clone(&machine))
            .with_read_timeout(Duration::from_millis(30));
        let task = tokio::spawn(server.serve(listener, rx));

        let mut stream = UnixStream::connect(&cfg.control_socket).await.unwrap();
        let mut reply = String::new();
        let _ = stream.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "ACK\n");
        assert_eq!(machine.phase().await, SessionPhase::Idle);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
