//! Provider registry — builds and holds every configured streaming client.

use std::collections::HashMap;
use std::sync::Arc;

use sw_domain::config::{ProviderConfig, ProviderKind};
use sw_domain::error::{Error, Result};

use crate::anthropic::AnthropicClient;
use crate::openai_compat::OpenAiCompatClient;
use crate::retry::RetryPolicy;
use crate::traits::StreamingClient;

/// One registered provider: the client plus its resolved retry policy.
#[derive(Clone)]
pub struct ProviderEntry {
    pub client: Arc<dyn StreamingClient>,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("client", &self.client.provider_id())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Holds every configured provider, keyed by id.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<String, ProviderEntry>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Build every configured provider.
    ///
    /// A provider that cannot be constructed (missing API key, bad config)
    /// is a configuration error — fatal at startup, per the error design.
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self> {
        let mut entries = HashMap::new();
        for config in configs {
            let client: Arc<dyn StreamingClient> = match config.kind {
                ProviderKind::Anthropic => Arc::new(AnthropicClient::from_config(config)?),
                ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatClient::from_config(config)?),
            };
            tracing::info!(provider = %config.id, kind = ?config.kind, "provider ready");
            entries.insert(
                config.id.clone(),
                ProviderEntry {
                    client,
                    retry: RetryPolicy::from(&config.retry),
                },
            );
        }
        Ok(Self { entries })
    }

    /// Register a client directly (tests, embedded providers).
    pub fn register(&mut self, id: impl Into<String>, client: Arc<dyn StreamingClient>, retry: RetryPolicy) {
        self.entries.insert(id.into(), ProviderEntry { client, retry });
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Result<ProviderEntry> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown provider '{id}'")))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Shut down every provider.
    pub async fn shutdown_all(&self) {
        for entry in self.entries.values() {
            entry.client.shutdown().await;
        }
    }
}
