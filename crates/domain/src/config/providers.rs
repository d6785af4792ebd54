//! LLM provider configuration.

use serde::{Deserialize, Serialize};

/// Which adapter implementation a provider entry uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
}

/// Configuration for a single remote LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique identifier, referenced by `session.provider`.
    pub id: String,

    pub kind: ProviderKind,

    /// API base URL without a trailing slash (one is stripped if present).
    #[serde(default)]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Plaintext API key. Prefer `api_key_env`; a plaintext key is accepted
    /// but logged as a warning when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier. When absent, the adapter uses its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Maximum output tokens requested per completion.
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn d_max_output_tokens() -> u32 {
    4096
}

/// Retry policy knobs for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds; attempt `n` waits `initial * 2^n`.
    #[serde(default = "d_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff sleep.
    #[serde(default = "d_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn d_max_retries() -> u32 {
    3
}

fn d_initial_backoff_ms() -> u64 {
    500
}

fn d_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: d_max_retries(),
            initial_backoff_ms: d_initial_backoff_ms(),
            max_backoff_ms: d_max_backoff_ms(),
        }
    }
}
