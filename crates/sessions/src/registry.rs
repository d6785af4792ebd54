//! In-process session registry.
//!
//! The registry is the single writer of session state: callers obtain
//! sessions only through its accessors, never by direct map access. Parent
//! and child sessions are linked through explicit relation tables
//! (child → parent, parent → [children]) rather than object back-references,
//! so serialization and teardown stay trivial.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use sw_domain::error::{Error, Result};
use sw_domain::session::Session;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    child_to_parent: RwLock<HashMap<String, String>>,
    parent_to_children: RwLock<HashMap<String, Vec<String>>>,
    /// Per-session execution locks: one `execute_message` at a time per
    /// session, while distinct sessions run in parallel.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a session, rebuilding its relation entries from
    /// the persisted link fields.
    pub fn insert(&self, session: Session) {
        if let Some(parent) = &session.parent_id {
            self.child_to_parent
                .write()
                .insert(session.id.clone(), parent.clone());
        }
        if !session.child_session_ids.is_empty() {
            self.parent_to_children
                .write()
                .insert(session.id.clone(), session.child_session_ids.clone());
        }
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// A snapshot of one session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Mutate one session through the single-writer accessor. Returns the
    /// closure's result, or a session error when the id is unknown.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::Session(format!("session '{id}' is not loaded")))?;
        Ok(f(session))
    }

    /// Record a parent/child relation in both tables.
    pub fn link_child(&self, parent_id: &str, child_id: &str) {
        self.child_to_parent
            .write()
            .insert(child_id.to_owned(), parent_id.to_owned());
        self.parent_to_children
            .write()
            .entry(parent_id.to_owned())
            .or_default()
            .push(child_id.to_owned());
    }

    pub fn parent_of(&self, child_id: &str) -> Option<String> {
        self.child_to_parent.read().get(child_id).cloned()
    }

    pub fn children_of(&self, parent_id: &str) -> Vec<String> {
        self.parent_to_children
            .read()
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The execution lock for a session (created on first use).
    pub fn execution_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
