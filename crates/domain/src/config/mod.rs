mod providers;
mod servers;
mod session;

pub use providers::*;
pub use servers::*;
pub use session::*;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name of the configuration file looked up by [`Config::discover`].
pub const CONFIG_FILE_NAME: &str = "switchboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    /// LLM provider definitions.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Tool-provider server definitions, in declared order.
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
}

impl Config {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("reading {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Walk up from `start` looking for a `switchboard.toml`.
    ///
    /// Returns the config and the path it was loaded from, or `None` when no
    /// ancestor directory carries one.
    pub fn discover(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = Some(start);
        while let Some(d) = dir {
            let candidate = d.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                return Ok(Some((config, candidate)));
            }
            dir = d.parent();
        }
        Ok(None)
    }

    /// Find a provider definition by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Find a server definition by name.
    pub fn server(&self, name: &str) -> Option<&ToolServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Issues with [`ConfigSeverity::Error`] are fatal at startup.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let err = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message,
        };
        let warn = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message,
        };

        // The session's default provider must exist once any provider is
        // declared; a fully empty provider list is a warning, not an error,
        // so a bare install can still start up.
        if self.providers.is_empty() {
            issues.push(warn(
                "providers",
                "no LLM providers configured".into(),
            ));
        } else if self.provider(&self.session.provider).is_none() {
            issues.push(err(
                "session.provider",
                format!("unknown provider '{}'", self.session.provider),
            ));
        }

        for provider in &self.providers {
            if provider.id.is_empty() {
                issues.push(err("providers.id", "provider id must not be empty".into()));
            }
            if provider.base_url.is_empty() {
                issues.push(err(
                    "providers.base_url",
                    format!("provider '{}' has an empty base_url", provider.id),
                ));
            }
            if provider.retry.max_retries > 10 {
                issues.push(warn(
                    "providers.retry.max_retries",
                    format!(
                        "provider '{}' allows {} retries, which is unusually high",
                        provider.id, provider.retry.max_retries
                    ),
                ));
            }
        }

        // Duplicate server names would make routing ambiguous.
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.as_str()) {
                issues.push(err(
                    "servers.name",
                    format!("duplicate server name '{}'", server.name),
                ));
            }
            if server.name.is_empty() {
                issues.push(err("servers.name", "server name must not be empty".into()));
            }
            if server.command.is_empty() && !server.disabled {
                issues.push(err(
                    "servers.command",
                    format!("server '{}' has no command", server.name),
                ));
            }
            if server.timeout_secs == 0 {
                issues.push(warn(
                    "servers.timeout_secs",
                    format!("server '{}' has a zero timeout", server.name),
                ));
            }
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
