//! The tool hub — holds every server connection, populates the shared tool
//! catalog, and routes tool calls and resource reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use sw_domain::catalog::{ToolCatalog, ToolDocumentation};
use sw_domain::config::ToolServerConfig;
use sw_domain::schema::ParamSchema;

use crate::approval::{ApprovalStore, GateOutcome};
use crate::connection::{ConnectionStatus, ServerConnection};
use crate::protocol::{ResourceReadResult, ToolCallResult};
use crate::transport::TransportError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("no connection for server '{0}'")]
    NotFound(String),

    #[error("server '{0}' is disabled")]
    Disabled(String),

    #[error("server '{0}' is not connected")]
    NotConnected(String),

    #[error("tool call declined: {server}/{tool}")]
    Declined {
        server: String,
        tool: String,
        reason: Option<String>,
    },

    #[error("approval timed out for {server}/{tool}")]
    ApprovalTimedOut { server: String, tool: String },

    #[error("tool call on '{server}' timed out after {timeout:?}")]
    CallTimeout { server: String, timeout: Duration },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol: {0}")]
    Protocol(String),
}

impl From<HubError> for sw_domain::Error {
    fn from(e: HubError) -> Self {
        match e {
            HubError::CallTimeout { .. } => sw_domain::Error::Timeout(e.to_string()),
            other => sw_domain::Error::Tool(other.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The seam the orchestrator consumes: tool dispatch without the connection
/// management surface.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, HubError>;

    async fn read_resource(&self, server: &str, uri: &str)
        -> Result<ResourceReadResult, HubError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolHub
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns all server connections. Sole writer of the tool catalog.
pub struct ToolHub {
    catalog: Arc<ToolCatalog>,
    approvals: Arc<ApprovalStore>,
    /// Connections in declared config order.
    connections: RwLock<Vec<Arc<ServerConnection>>>,
}

impl ToolHub {
    pub fn new(catalog: Arc<ToolCatalog>, approvals: Arc<ApprovalStore>) -> Self {
        Self {
            catalog,
            approvals,
            connections: RwLock::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    pub fn approvals(&self) -> &Arc<ApprovalStore> {
        &self.approvals
    }

    /// Spawn or replace connections for the given configs.
    ///
    /// Per-server failures are recorded on the connection entry and never
    /// raised. A connection whose config is unchanged field-by-field keeps
    /// its live subprocess; servers dropped from config are torn down. The
    /// resulting list follows declared config order.
    pub async fn initialize_servers(&self, configs: &[ToolServerConfig]) {
        let current: Vec<Arc<ServerConnection>> = self.connections.read().clone();
        let mut by_name: HashMap<String, Arc<ServerConnection>> = current
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();

        // Tear down servers that disappeared from config.
        for conn in &current {
            if !configs.iter().any(|c| c.name == conn.name) {
                tracing::info!(server = %conn.name, "server removed from config, tearing down");
                by_name.remove(&conn.name);
                self.catalog.remove_server(&conn.name);
                conn.teardown().await;
            }
        }

        // Keep unchanged connections; spawn new/changed ones concurrently.
        let mut slots: Vec<Option<Arc<ServerConnection>>> = vec![None; configs.len()];
        let mut pending = Vec::new();
        for (idx, config) in configs.iter().enumerate() {
            if let Some(existing) = by_name.get(&config.name) {
                if existing.config == *config {
                    slots[idx] = Some(existing.clone());
                    continue;
                }
                tracing::info!(
                    server = %config.name,
                    "server config changed, recreating connection"
                );
                self.catalog.remove_server(&config.name);
                existing.teardown().await;
            }
            if config.disabled {
                slots[idx] = Some(ServerConnection::offline(config.clone()));
                continue;
            }
            pending.push((idx, ServerConnection::connect(config.clone())));
        }

        let (indices, futures): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let connected = futures_util::future::join_all(futures).await;
        for (idx, conn) in indices.into_iter().zip(connected) {
            slots[idx] = Some(conn);
        }

        let new_list: Vec<Arc<ServerConnection>> = slots.into_iter().flatten().collect();

        for conn in &new_list {
            if conn.status() == ConnectionStatus::Connected {
                self.register_catalog(conn);
            }
        }

        let ready = new_list
            .iter()
            .filter(|c| c.status() == ConnectionStatus::Connected)
            .count();
        tracing::info!(
            servers = new_list.len(),
            connected = ready,
            "tool hub initialized"
        );

        *self.connections.write() = new_list;
    }

    /// Tear down and re-establish one connection. Other connections are
    /// unaffected; the entry's status reads `connecting` for the duration.
    pub async fn restart_connection(&self, name: &str) -> Result<(), HubError> {
        let conn = self
            .connection(name)
            .ok_or_else(|| HubError::NotFound(name.to_owned()))?;
        if conn.config.disabled {
            return Err(HubError::Disabled(name.to_owned()));
        }

        self.catalog.remove_server(name);
        conn.reconnect().await;
        if conn.status() == ConnectionStatus::Connected {
            self.register_catalog(&conn);
            Ok(())
        } else {
            Err(HubError::NotConnected(name.to_owned()))
        }
    }

    /// Shut one connection down and drop it from the hub and catalog.
    pub async fn delete_connection(&self, name: &str) -> Result<(), HubError> {
        let conn = {
            let mut list = self.connections.write();
            let idx = list
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| HubError::NotFound(name.to_owned()))?;
            list.remove(idx)
        };
        self.catalog.remove_server(name);
        conn.teardown().await;
        Ok(())
    }

    /// Look up a connection by server name.
    pub fn connection(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.connections.read().iter().find(|c| c.name == name).cloned()
    }

    /// All connections, in declared config order.
    pub fn connections(&self) -> Vec<Arc<ServerConnection>> {
        self.connections.read().clone()
    }

    /// Gracefully shut down every connection and invalidate the catalog.
    pub async fn shutdown(&self) {
        let list = std::mem::take(&mut *self.connections.write());
        let futs: Vec<_> = list.iter().map(|c| c.teardown()).collect();
        futures_util::future::join_all(futs).await;
        self.catalog.clear();
    }

    /// Derive catalog documentation from a connection's discovered tools.
    fn register_catalog(&self, conn: &Arc<ServerConnection>) {
        let mut docs = Vec::new();
        for descriptor in conn.descriptors() {
            let schema = match ParamSchema::from_value(&descriptor.input_schema) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(
                        server = %conn.name,
                        tool = %descriptor.name,
                        error = %e,
                        "skipping tool with unusable schema"
                    );
                    continue;
                }
            };
            docs.push(ToolDocumentation {
                server: conn.name.clone(),
                name: descriptor.name,
                description: descriptor.description,
                schema,
                always_allow: descriptor.always_allow,
            });
        }
        self.catalog.register_server(&conn.name, docs);
    }
}

#[async_trait]
impl ToolDispatcher for ToolHub {
    /// Route a tool call to its server connection.
    ///
    /// The approval gate sits between lookup and dispatch: unless the server
    /// auto-approves or the descriptor is `always_allow`, the call parks
    /// until a reviewer answers, and a denial means the transport is never
    /// touched.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, HubError> {
        let conn = self
            .connection(server)
            .ok_or_else(|| HubError::NotFound(server.to_owned()))?;
        if conn.config.disabled {
            return Err(HubError::Disabled(server.to_owned()));
        }

        let auto_approved = conn.config.auto_approve
            || conn
                .descriptor(tool)
                .map(|d| d.always_allow)
                .unwrap_or(false);
        if !auto_approved {
            match self
                .approvals
                .wait_for_approval(server, tool, &arguments)
                .await
            {
                GateOutcome::Approved => {}
                GateOutcome::Denied { reason } => {
                    tracing::info!(server = %server, tool = %tool, "tool call declined");
                    return Err(HubError::Declined {
                        server: server.to_owned(),
                        tool: tool.to_owned(),
                        reason,
                    });
                }
                GateOutcome::TimedOut => {
                    return Err(HubError::ApprovalTimedOut {
                        server: server.to_owned(),
                        tool: tool.to_owned(),
                    });
                }
            }
        }

        tracing::debug!(server = %server, tool = %tool, "dispatching tool call");
        conn.call_tool(tool, arguments).await
    }

    async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ResourceReadResult, HubError> {
        let conn = self
            .connection(server)
            .ok_or_else(|| HubError::NotFound(server.to_owned()))?;
        if conn.config.disabled {
            return Err(HubError::Disabled(server.to_owned()));
        }
        conn.read_resource(uri).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A shell stub that speaks just enough of the protocol for the
    /// handshake, discovery, and one tool call (ids are deterministic
    /// because the transport allocates them sequentially).
    const STUB_SERVER: &str = r#"while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stub","version":"0.0"}}}' ;;
    *'"method":"tools/list"'*) echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo_text","description":"Echo text back","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}}]}}' ;;
    *'"method":"tools/call"'*) echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"stub says hi"}]}}' ;;
  esac
done"#;

    fn stub_config(name: &str, auto_approve: bool) -> ToolServerConfig {
        ToolServerConfig {
            name: name.into(),
            command: "sh".into(),
            args: vec!["-c".into(), STUB_SERVER.into()],
            env: Default::default(),
            timeout_secs: 5,
            auto_approve,
            always_allow: Vec::new(),
            disabled: false,
        }
    }

    fn disabled_config(name: &str) -> ToolServerConfig {
        ToolServerConfig {
            name: name.into(),
            command: String::new(),
            args: Vec::new(),
            env: Default::default(),
            timeout_secs: 60,
            auto_approve: false,
            always_allow: Vec::new(),
            disabled: true,
        }
    }

    fn make_hub() -> ToolHub {
        ToolHub::new(
            Arc::new(ToolCatalog::new()),
            Arc::new(ApprovalStore::new(Duration::from_secs(2))),
        )
    }

    #[tokio::test]
    async fn initialize_discover_and_call() {
        let hub = make_hub();
        hub.initialize_servers(&[stub_config("stub", true)]).await;

        let conn = hub.connection("stub").unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(hub.catalog().server_for_tool("echo_text").as_deref(), Some("stub"));

        let result = hub
            .call_tool("stub", "echo_text", json!({"text": "hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.text(), "stub says hi");

        hub.shutdown().await;
        assert!(hub.catalog().is_empty());
    }

    #[tokio::test]
    async fn unchanged_config_keeps_the_connection() {
        let hub = make_hub();
        let configs = vec![disabled_config("a"), stub_config("b", true)];
        hub.initialize_servers(&configs).await;
        let before = hub.connection("b").unwrap();

        hub.initialize_servers(&configs).await;
        let after = hub.connection("b").unwrap();
        assert!(Arc::ptr_eq(&before, &after), "connection was recreated");

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn changed_config_recreates_the_connection() {
        let hub = make_hub();
        hub.initialize_servers(&[stub_config("s", true)]).await;
        let before = hub.connection("s").unwrap();

        let mut changed = stub_config("s", true);
        changed.timeout_secs = 10;
        hub.initialize_servers(&[changed]).await;
        let after = hub.connection("s").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn connections_follow_declared_order() {
        let hub = make_hub();
        hub.initialize_servers(&[disabled_config("zeta"), disabled_config("alpha")])
            .await;
        let names: Vec<_> = hub.connections().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        hub.initialize_servers(&[disabled_config("alpha"), disabled_config("zeta")])
            .await;
        let names: Vec<_> = hub.connections().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn disabled_server_fails_without_transport() {
        let hub = make_hub();
        hub.initialize_servers(&[disabled_config("off")]).await;

        let err = hub.call_tool("off", "anything", json!({})).await.unwrap_err();
        assert!(matches!(err, HubError::Disabled(name) if name == "off"));
    }

    #[tokio::test]
    async fn unknown_server_is_not_found() {
        let hub = make_hub();
        let err = hub.call_tool("ghost", "t", json!({})).await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_server_is_isolated() {
        let hub = make_hub();
        let mut broken = stub_config("broken", true);
        broken.command = "switchboard-test-no-such-binary".into();
        hub.initialize_servers(&[broken, stub_config("ok", true)]).await;

        let broken_conn = hub.connection("broken").unwrap();
        assert_eq!(broken_conn.status(), ConnectionStatus::Disconnected);
        assert!(broken_conn.error_text().is_some());

        // The healthy server is unaffected.
        let result = hub
            .call_tool("ok", "echo_text", json!({"text": "x"}))
            .await
            .unwrap();
        assert!(result.success);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn denied_approval_terminates_the_call() {
        let hub = make_hub();
        hub.initialize_servers(&[stub_config("gated", false)]).await;

        let approvals = hub.approvals().clone();
        let mut rx = approvals.subscribe();
        tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                approvals.deny(&request.id, Some("not today".into()));
            }
        });

        let err = hub
            .call_tool("gated", "echo_text", json!({"text": "x"}))
            .await
            .unwrap_err();
        match err {
            HubError::Declined { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("not today"));
            }
            other => panic!("expected Declined, got {other:?}"),
        }

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn restart_preserves_entry_identity_and_reconnects() {
        let hub = make_hub();
        hub.initialize_servers(&[stub_config("stub", true)]).await;
        let before = hub.connection("stub").unwrap();

        hub.restart_connection("stub").await.unwrap();
        let after = hub.connection("stub").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.status(), ConnectionStatus::Connected);

        // Still functional against the fresh subprocess.
        let result = hub
            .call_tool("stub", "echo_text", json!({"text": "x"}))
            .await
            .unwrap();
        assert!(result.success);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn restart_of_unknown_server_is_not_found() {
        let hub = make_hub();
        assert!(matches!(
            hub.restart_connection("ghost").await.unwrap_err(),
            HubError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_connection_removes_catalog_entries() {
        let hub = make_hub();
        hub.initialize_servers(&[stub_config("stub", true)]).await;
        assert!(hub.catalog().get("echo_text").is_some());

        hub.delete_connection("stub").await.unwrap();
        assert!(hub.connection("stub").is_none());
        assert!(hub.catalog().get("echo_text").is_none());
    }
}
