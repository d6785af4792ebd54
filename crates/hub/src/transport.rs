//! Stdio transport to tool-provider subprocesses.
//!
//! Each provider is a spawned child process speaking newline-delimited
//! JSON-RPC over stdin/stdout. Stderr is diagnostic only: it is captured
//! line-by-line into a buffer owned by the connection, never treated as
//! protocol.
//!
//! The close hook and stderr reader are wired up at spawn time, before any
//! handshake traffic, so early failures are never missed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use sw_domain::config::ToolServerConfig;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tool server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,
}

/// Hooks the owning connection registers before the handshake.
#[derive(Clone)]
pub struct TransportHooks {
    /// Accumulated stderr output, appended line-by-line.
    pub stderr: Arc<parking_lot::Mutex<String>>,
    /// Invoked once when the subprocess goes away (stderr EOF or stdout EOF).
    pub on_close: Arc<dyn Fn() + Send + Sync>,
}

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line. The
/// `request_lock` serializes entire request/response cycles — one in-flight
/// request per connection is the supported model.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    /// Serializes full request/response cycles to prevent response mismatching.
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    on_close: Arc<dyn Fn() + Send + Sync>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("alive", &self.alive.load(std::sync::atomic::Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Spawn a child process from the given server config.
    ///
    /// The stderr reader task starts immediately; handshake traffic is the
    /// caller's next step.
    pub fn spawn(config: &ToolServerConfig, hooks: TransportHooks) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(TransportError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stderr",
            ))
        })?;

        let alive = Arc::new(AtomicBool::new(true));

        // Stderr reader: diagnostic capture plus prompt close detection —
        // stderr reaching EOF means the process is gone.
        {
            let server = config.name.clone();
            let buf = hooks.stderr.clone();
            let on_close = hooks.on_close.clone();
            let alive = alive.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, line = %line, "tool server stderr");
                    let mut buf = buf.lock();
                    buf.push_str(&line);
                    buf.push('\n');
                }
                if alive.swap(false, Ordering::SeqCst) {
                    tracing::debug!(server = %server, "tool server stderr closed");
                    on_close();
                }
            });
        }

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive,
            on_close: hooks.on_close,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Get the next unique request ID.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn mark_closed(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            (self.on_close)();
        }
    }

    /// Write a line of JSON to stdin.
    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON lines.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines to prevent spinning
    /// on a misconfigured server that writes logging to stdout.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.mark_closed();
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.mark_closed();
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "tool server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from tool server stdout");
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// The whole request/response cycle runs under the request lock;
    /// interleaved notifications from the server are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending tool server request");
        self.write_line(&json).await?;

        let result = tokio::time::timeout(timeout, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                    tracing::debug!(
                        expected_id = id,
                        got_id = resp.id,
                        "received response for different request, continuing"
                    );
                }
                tracing::debug!(line = %line, "skipping non-matching message from tool server");
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending tool server notification");
        self.write_line(&json).await
    }

    /// Shut the transport down gracefully: close stdin, wait briefly, kill.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing tool server stdin");
            }
        }
        let timeout = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        match timeout {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "tool server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for tool server process");
            }
            Err(_) => {
                tracing::warn!("tool server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill tool server process");
                }
            }
        }
    }
}
