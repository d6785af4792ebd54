//! `sw-domain` — shared types for Switchboard.
//!
//! Everything the other crates agree on lives here: the shared error type,
//! the configuration model, the session/message data model, the streaming
//! chunk taxonomy, the typed parameter-schema representation, and the
//! derived tool catalog.

pub mod catalog;
pub mod config;
pub mod error;
pub mod schema;
pub mod session;
pub mod stream;

// Re-exports for convenience.
pub use error::{Error, Result};
pub use session::{Message, Role, Session, SessionStatus};
pub use stream::{BoxStream, Chunk, TokenUsage};
