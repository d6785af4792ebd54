//! Tool-provider server configuration.
//!
//! Servers are declared as an ordered list; the hub sorts its connection
//! list to match this order after every batch update. `PartialEq` on the
//! full struct powers the hub's config-diff policy: a connection is only
//! recreated when its resolved config differs field-by-field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for a single tool-provider subprocess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolServerConfig {
    /// Unique name, used for routing and catalog attribution.
    pub name: String,

    /// The command to spawn (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-call timeout in seconds.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip the approval gate for every tool on this server.
    #[serde(default)]
    pub auto_approve: bool,

    /// Tool names that skip the approval gate individually.
    #[serde(default)]
    pub always_allow: Vec<String>,

    /// A disabled server is listed but never spawned; calls to it fail
    /// without touching any transport.
    #[serde(default)]
    pub disabled: bool,
}

fn d_timeout_secs() -> u64 {
    60
}

impl ToolServerConfig {
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let raw = r#"
            name = "filesystem"
            command = "npx"
            args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        "#;
        let config: ToolServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.auto_approve);
        assert!(!config.disabled);
        assert!(config.always_allow.is_empty());
    }

    #[test]
    fn field_by_field_equality() {
        let raw = r#"
            name = "fs"
            command = "npx"
            args = ["a"]
            [env]
            NODE_ENV = "production"
        "#;
        let a: ToolServerConfig = toml::from_str(raw).unwrap();
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.args.push("b".into());
        assert_ne!(a, c);

        let mut d = a.clone();
        d.env.insert("NODE_ENV".into(), "development".into());
        assert_ne!(a, d);
    }

    #[test]
    fn call_timeout_from_secs() {
        let raw = r#"
            name = "slow"
            command = "slow-server"
            timeout_secs = 120
        "#;
        let config: ToolServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.call_timeout(), std::time::Duration::from_secs(120));
    }
}
