//! `sw-sessions` — session management for Switchboard.
//!
//! Sessions are persistent, resumable conversations: one JSON document per
//! session under a project-local state directory, an in-process registry
//! (the single writer) with explicit parent/child relation tables, role
//! loading for delegated child sessions, and the orchestrator that drives
//! the model-call / tool-call loop.

pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod roles;
pub mod store;

pub use orchestrator::{ExecuteResult, Orchestrator};
pub use registry::SessionRegistry;
pub use roles::{RoleConfig, RoleLoader};
pub use store::{discover_state_dir, SessionStore};
