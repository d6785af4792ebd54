//! On-disk session persistence.
//!
//! One JSON document per session, named by session id, under
//! `<state>/sessions/`. Every save is a full-file overwrite — no partial
//! writes, no cross-crash transactional guarantee.

use std::path::{Path, PathBuf};

use sw_domain::error::{Error, Result};
use sw_domain::session::Session;

/// Name of the project-local state directory.
pub const STATE_DIR_NAME: &str = ".switchboard";

/// Walk up from `start` looking for an existing `.switchboard` directory.
/// When none exists anywhere up the tree, the answer is `start/.switchboard`
/// (created lazily by [`SessionStore::new`]).
pub fn discover_state_dir(start: &Path) -> PathBuf {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(STATE_DIR_NAME);
        if candidate.is_dir() {
            return candidate;
        }
        dir = d.parent();
    }
    start.join(STATE_DIR_NAME)
}

/// Session store backed by one JSON file per session.
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the given state directory, creating
    /// `<state>/sessions/` as needed.
    pub fn new(state_path: &Path) -> Result<Self> {
        let sessions_dir = state_path.join("sessions");
        std::fs::create_dir_all(&sessions_dir).map_err(Error::Io)?;

        tracing::info!(path = %sessions_dir.display(), "session store ready");
        Ok(Self { sessions_dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Resume takes externally supplied ids; keep them inside the dir.
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(Error::Session(format!("invalid session id '{id}'")));
        }
        Ok(self.sessions_dir.join(format!("{id}.json")))
    }

    /// Persist a session. Full-file overwrite.
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, json).map_err(Error::Io)?;
        Ok(())
    }

    /// Load a session by id. A missing file or a corrupt document is a
    /// session error.
    pub fn load(&self, id: &str) -> Result<Session> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(Error::Session(format!("session '{id}' not found")));
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Session(format!("session '{id}' is corrupt: {e}")))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// List every stored session id.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.sessions_dir).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
