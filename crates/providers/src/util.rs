//! Shared utility functions for provider adapters.

use sw_domain::config::ProviderConfig;
use sw_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts map to [`Error::Timeout`]; errors carrying an HTTP status keep
/// it; everything else (connect failure, reset mid-body) becomes an HTTP
/// error with no status — which the retry layer treats as transient.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Resolve the API key for a provider.
///
/// Precedence: `api_key` (plaintext — warn), then `api_key_env`. A provider
/// with neither is a configuration error.
pub fn resolve_api_key(config: &ProviderConfig) -> Result<String> {
    if let Some(ref key) = config.api_key {
        tracing::warn!(
            provider = %config.id,
            "API key loaded from plaintext config field 'api_key' — prefer 'api_key_env'"
        );
        return Ok(key.clone());
    }

    if let Some(ref env_var) = config.api_key_env {
        return std::env::var(env_var).map_err(|_| {
            Error::Config(format!(
                "provider '{}': environment variable '{}' not set or not valid UTF-8",
                config.id, env_var
            ))
        });
    }

    Err(Error::Config(format!(
        "provider '{}': no API key configured (set 'api_key_env' or 'api_key')",
        config.id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_domain::config::{ProviderKind, RetryConfig};

    fn config(api_key: Option<&str>, api_key_env: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: "test".into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://example.com".into(),
            api_key_env: api_key_env.map(str::to_owned),
            api_key: api_key.map(str::to_owned),
            default_model: None,
            max_output_tokens: 4096,
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn plaintext_key_wins() {
        let cfg = config(Some("sk-test"), Some("SW_TEST_UNSET_VAR"));
        assert_eq!(resolve_api_key(&cfg).unwrap(), "sk-test");
    }

    #[test]
    fn env_var_key() {
        std::env::set_var("SW_TEST_RESOLVE_KEY_1234", "env-secret");
        let cfg = config(None, Some("SW_TEST_RESOLVE_KEY_1234"));
        assert_eq!(resolve_api_key(&cfg).unwrap(), "env-secret");
        std::env::remove_var("SW_TEST_RESOLVE_KEY_1234");
    }

    #[test]
    fn missing_env_var_is_a_config_error() {
        let cfg = config(None, Some("SW_TEST_NONEXISTENT_VAR_8888"));
        let err = resolve_api_key(&cfg).unwrap_err();
        assert!(err.to_string().contains("SW_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn no_key_at_all_is_a_config_error() {
        let cfg = config(None, None);
        assert!(matches!(resolve_api_key(&cfg).unwrap_err(), Error::Config(_)));
    }
}
