//! Role definitions for delegated sessions.
//!
//! A role is a TOML file (`<roles_dir>/<name>.toml`) supplying the child
//! session's persona, working instructions, and the subset of tool servers
//! it may use.

use std::path::PathBuf;

use serde::Deserialize;

use sw_domain::error::{Error, Result};

/// A loaded role definition. Read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    /// Who the session is ("You are a ...").
    pub definition: String,

    /// Working instructions appended to the definition.
    #[serde(default)]
    pub instructions: String,

    /// Servers this role may use. Empty means all connected servers.
    #[serde(default)]
    pub available_servers: Vec<String>,
}

/// Loads role files from the configured directory.
pub struct RoleLoader {
    dir: Option<PathBuf>,
}

impl RoleLoader {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Load a role by name.
    pub fn get_role(&self, name: &str) -> Result<RoleConfig> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!("invalid role name '{name}'")));
        }

        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| Error::Config("no roles directory configured".into()))?;
        let path = dir.join(format!("{name}.toml"));
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("reading role '{name}' from {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing role '{name}': {e}")))
    }
}
