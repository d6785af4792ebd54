//! `sw-hub` — the tool hub for Switchboard.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with tool-provider
//!   subprocesses (capability discovery, tool invocation, resource reads).
//! - A stdio transport that spawns child processes, captures their stderr,
//!   and speaks newline-delimited JSON-RPC over stdin/stdout.
//! - A [`ServerConnection`] tracking one provider's subprocess, status, and
//!   discovered tools.
//! - A [`ToolHub`] that owns every connection, populates the shared tool
//!   catalog, and routes `call_tool`/`read_resource` with per-server
//!   timeouts and an out-of-band approval gate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sw_domain::catalog::ToolCatalog;
//! use sw_hub::{ApprovalStore, ToolHub};
//!
//! let catalog = Arc::new(ToolCatalog::new());
//! let approvals = Arc::new(ApprovalStore::new(std::time::Duration::from_secs(300)));
//! let hub = ToolHub::new(catalog, approvals);
//! hub.initialize_servers(&config.servers).await;
//!
//! let result = hub.call_tool("filesystem", "read_file", json!({"path": "/tmp/a"})).await?;
//! ```

pub mod approval;
pub mod connection;
pub mod hub;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalStore};
pub use connection::{ConnectionStatus, ServerConnection, ToolDescriptor};
pub use hub::{HubError, ToolDispatcher, ToolHub};
pub use protocol::{ContentItem, ResourceReadResult, ToolCallResult};
pub use transport::TransportError;
