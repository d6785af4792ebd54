//! One live connection to a tool-provider subprocess.
//!
//! A connection owns exactly one transport and tracks its lifecycle:
//! `Connecting` while the subprocess is being spawned and handshaken,
//! `Connected` once the tool list has been fetched, `Disconnected` on any
//! transport error, close event, or explicit teardown. Failures are recorded
//! on the connection — they are never fatal to the hub as a whole.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use sw_domain::config::ToolServerConfig;

use crate::hub::HubError;
use crate::protocol::{
    self, ResourceReadResult, ToolCallPayload, ToolCallResult, ToolsListResult,
};
use crate::transport::{StdioTransport, TransportError, TransportHooks};

/// Timeout for handshake and discovery requests (tool calls use the
/// per-server config timeout instead).
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle status of a server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// A tool declared by a connected server, with the approval policy the
/// server config assigns to it.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub always_allow: bool,
}

/// A tool-provider server connection (one per configured server).
pub struct ServerConnection {
    pub name: String,
    pub config: ToolServerConfig,
    status: RwLock<ConnectionStatus>,
    /// Handshake/spawn failure, if any.
    last_error: Mutex<Option<String>>,
    /// Accumulated stderr output from the subprocess.
    stderr_log: Arc<Mutex<String>>,
    /// Tools discovered via `tools/list`; refreshed on reconnect.
    tools: RwLock<Vec<ToolDescriptor>>,
    transport: RwLock<Option<Arc<StdioTransport>>>,
}

impl ServerConnection {
    /// Create a connection entry without spawning anything (disabled
    /// servers, and the base for [`ServerConnection::connect`]).
    pub fn offline(config: ToolServerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            config,
            status: RwLock::new(ConnectionStatus::Disconnected),
            last_error: Mutex::new(None),
            stderr_log: Arc::new(Mutex::new(String::new())),
            tools: RwLock::new(Vec::new()),
            transport: RwLock::new(None),
        })
    }

    /// Spawn the subprocess, perform the capability handshake, and fetch the
    /// tool list.
    ///
    /// Always returns a connection entry; a failure is recorded on it
    /// (status `Disconnected`, error text set) instead of being raised.
    pub async fn connect(config: ToolServerConfig) -> Arc<Self> {
        let conn = Self::offline(config);
        conn.reconnect().await;
        conn
    }

    /// (Re)establish the subprocess on this entry.
    ///
    /// Any live transport is shut down first; accumulated error text is
    /// reset; status reads `Connecting` for the duration.
    pub async fn reconnect(self: &Arc<Self>) {
        if self.transport.read().is_some() {
            self.teardown().await;
        }
        self.set_status(ConnectionStatus::Connecting);
        *self.last_error.lock() = None;
        self.stderr_log.lock().clear();

        match self.establish().await {
            Ok(()) => {
                self.set_status(ConnectionStatus::Connected);
                tracing::info!(
                    server = %self.name,
                    tool_count = self.tools.read().len(),
                    "tool server connected"
                );
            }
            Err(e) => {
                self.record_error(e.to_string());
                self.set_status(ConnectionStatus::Disconnected);
                tracing::warn!(
                    server = %self.name,
                    error = %e,
                    "tool server connection failed"
                );
            }
        }
    }

    async fn establish(self: &Arc<Self>) -> Result<(), HubError> {
        // The close hook must be live before the handshake so an early exit
        // still flips the status.
        let weak = Arc::downgrade(self);
        let hooks = TransportHooks {
            stderr: self.stderr_log.clone(),
            on_close: Arc::new(move || {
                if let Some(conn) = weak.upgrade() {
                    conn.set_status(ConnectionStatus::Disconnected);
                    tracing::debug!(server = %conn.name, "tool server transport closed");
                }
            }),
        };

        let transport = Arc::new(StdioTransport::spawn(&self.config, hooks)?);
        *self.transport.write() = Some(transport.clone());

        // Step 1: `initialize`.
        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| HubError::Protocol(format!("serializing initialize params: {e}")))?;
        let resp = transport
            .request("initialize", Some(params_value), STARTUP_TIMEOUT)
            .await?;
        if let Err(err) = resp.into_result() {
            return Err(HubError::Protocol(format!("initialize failed: {err}")));
        }

        // Step 2: `notifications/initialized`.
        transport.notify("notifications/initialized").await?;

        // Step 3: discover tools.
        let tools_resp = transport.request("tools/list", None, STARTUP_TIMEOUT).await?;
        let tools = match tools_resp.into_result() {
            Ok(value) => match serde_json::from_value::<ToolsListResult>(value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(
                        server = %self.name,
                        error = %e,
                        "failed to parse tools/list result"
                    );
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(
                    server = %self.name,
                    error = %err,
                    "tools/list returned error, server will have no tools"
                );
                Vec::new()
            }
        };

        let descriptors = tools
            .into_iter()
            .map(|t| {
                let always_allow =
                    self.config.auto_approve || self.config.always_allow.contains(&t.name);
                ToolDescriptor {
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                    always_allow,
                }
            })
            .collect();
        *self.tools.write() = descriptors;

        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    /// The connection's accumulated error text: the last hard failure plus
    /// any stderr output the subprocess produced.
    pub fn error_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(err) = self.last_error.lock().clone() {
            parts.push(err);
        }
        let stderr = self.stderr_log.lock();
        if !stderr.is_empty() {
            parts.push(stderr.trim_end().to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Discovered tools (empty until connected).
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.read().clone()
    }

    /// Look up one descriptor by tool name.
    pub fn descriptor(&self, tool: &str) -> Option<ToolDescriptor> {
        self.tools.read().iter().find(|t| t.name == tool).cloned()
    }

    fn live_transport(&self) -> Result<Arc<StdioTransport>, HubError> {
        let transport = self
            .transport
            .read()
            .clone()
            .ok_or_else(|| HubError::NotConnected(self.name.clone()))?;
        if !transport.is_alive() {
            return Err(HubError::NotConnected(self.name.clone()));
        }
        Ok(transport)
    }

    /// Invoke a tool on this server, with the per-server call timeout.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult, HubError> {
        let transport = self.live_transport()?;
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });

        let resp = transport
            .request("tools/call", Some(params), self.config.call_timeout())
            .await
            .map_err(|e| self.map_call_error(e))?;

        let value = resp
            .into_result()
            .map_err(|err| HubError::Protocol(format!("tools/call failed: {err}")))?;
        let payload: ToolCallPayload = serde_json::from_value(value)
            .map_err(|e| HubError::Protocol(format!("parsing tools/call result: {e}")))?;
        Ok(ToolCallResult::from(payload))
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceReadResult, HubError> {
        let transport = self.live_transport()?;
        let params = serde_json::json!({ "uri": uri });

        let resp = transport
            .request("resources/read", Some(params), self.config.call_timeout())
            .await
            .map_err(|e| self.map_call_error(e))?;

        let value = resp
            .into_result()
            .map_err(|err| HubError::Protocol(format!("resources/read failed: {err}")))?;
        serde_json::from_value(value)
            .map_err(|e| HubError::Protocol(format!("parsing resources/read result: {e}")))
    }

    fn map_call_error(&self, e: TransportError) -> HubError {
        match e {
            TransportError::Timeout => HubError::CallTimeout {
                server: self.name.clone(),
                timeout: self.config.call_timeout(),
            },
            other => HubError::Transport(other),
        }
    }

    /// Tear the connection down: shut the subprocess down and drop the
    /// transport. The entry itself stays reusable (status `Disconnected`).
    pub async fn teardown(&self) {
        let transport = self.transport.write().take();
        if let Some(transport) = transport {
            transport.shutdown().await;
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.tools.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, command: &str) -> ToolServerConfig {
        ToolServerConfig {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Default::default(),
            timeout_secs: 5,
            auto_approve: false,
            always_allow: Vec::new(),
            disabled: false,
        }
    }

    #[test]
    fn offline_connection_is_disconnected() {
        let conn = ServerConnection::offline(config("fs", "cmd"));
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(conn.error_text().is_none());
        assert!(conn.descriptors().is_empty());
    }

    #[tokio::test]
    async fn failed_spawn_records_error() {
        let conn = ServerConnection::connect(config("fs", "switchboard-test-no-such-binary")).await;
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        let err = conn.error_text().unwrap();
        assert!(err.contains("I/O") || err.contains("No such file"), "got: {err}");
    }

    #[tokio::test]
    async fn call_on_disconnected_connection_fails() {
        let conn = ServerConnection::offline(config("fs", "cmd"));
        let err = conn
            .call_tool("read_file", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotConnected(_)));
    }
}
