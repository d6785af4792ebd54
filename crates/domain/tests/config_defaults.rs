//! Integration tests: a sparse TOML file must deserialize into a fully
//! defaulted [`Config`] without surprises.

use sw_domain::config::{Config, ConfigSeverity, ProviderKind};

#[test]
fn empty_config_is_valid_toml() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.session.provider, "anthropic");
    assert!(config.providers.is_empty());
    assert!(config.servers.is_empty());
}

#[test]
fn empty_config_warns_but_does_not_error() {
    let config: Config = toml::from_str("").unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Warning && i.field == "providers"));
    assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
}

#[test]
fn full_config_parses() {
    let raw = r#"
        [session]
        provider = "claude"
        roles_dir = "roles"
        approval_timeout_secs = 120

        [[providers]]
        id = "claude"
        kind = "anthropic"
        base_url = "https://api.anthropic.com"
        api_key_env = "ANTHROPIC_API_KEY"
        default_model = "claude-sonnet-4-20250514"
        max_output_tokens = 8192

        [providers.retry]
        max_retries = 4
        initial_backoff_ms = 250

        [[providers]]
        id = "local"
        kind = "openai_compat"
        base_url = "http://localhost:11434/v1"

        [[servers]]
        name = "filesystem"
        command = "npx"
        args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        auto_approve = true

        [[servers]]
        name = "browser"
        command = "browser-tools"
        timeout_secs = 120
        always_allow = ["screenshot"]
    "#;
    let config: Config = toml::from_str(raw).unwrap();

    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].kind, ProviderKind::Anthropic);
    assert_eq!(config.providers[0].retry.max_retries, 4);
    assert_eq!(config.providers[1].kind, ProviderKind::OpenaiCompat);

    assert_eq!(config.servers.len(), 2);
    assert!(config.servers[0].auto_approve);
    assert_eq!(config.servers[1].timeout_secs, 120);
    assert_eq!(config.servers[1].always_allow, vec!["screenshot"]);

    assert!(config
        .validate()
        .iter()
        .all(|i| i.severity != ConfigSeverity::Error));
}
