//! Session and workspace configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default provider id for new sessions.
    #[serde(default = "d_provider")]
    pub provider: String,

    /// Explicit state directory. When absent, a `.switchboard` directory is
    /// discovered walking up from the working directory, or created there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Directory holding `<name>.toml` role definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles_dir: Option<PathBuf>,

    /// How long a pending tool-approval may sit unanswered before the call
    /// fails.
    #[serde(default = "d_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
}

fn d_provider() -> String {
    "anthropic".into()
}

fn d_approval_timeout_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            state_dir: None,
            roles_dir: None,
            approval_timeout_secs: d_approval_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert!(config.state_dir.is_none());
        assert_eq!(config.approval_timeout_secs, 300);
    }

    #[test]
    fn deserialize_overrides() {
        let raw = r#"
            provider = "local"
            state_dir = "/var/lib/switchboard"
            approval_timeout_secs = 30
        "#;
        let config: SessionConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.provider, "local");
        assert_eq!(
            config.state_dir.as_deref(),
            Some(std::path::Path::new("/var/lib/switchboard"))
        );
        assert_eq!(config.approval_timeout_secs, 30);
    }
}
