//! App construction: wire every subsystem from config and return the
//! handles the CLI commands share.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use sw_domain::catalog::ToolCatalog;
use sw_domain::config::Config;
use sw_hub::{ApprovalStore, ToolHub};
use sw_providers::ProviderRegistry;
use sw_sessions::{discover_state_dir, Orchestrator, RoleLoader, SessionRegistry, SessionStore};

pub struct App {
    pub catalog: Arc<ToolCatalog>,
    pub hub: Arc<ToolHub>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Initialize every subsystem and return a fully-wired [`App`].
pub async fn build(config: Config) -> anyhow::Result<App> {
    // ── Catalog + approval gate + hub ────────────────────────────────
    let catalog = Arc::new(ToolCatalog::new());
    let approvals = Arc::new(ApprovalStore::new(Duration::from_secs(
        config.session.approval_timeout_secs,
    )));
    let hub = Arc::new(ToolHub::new(catalog.clone(), approvals));
    hub.initialize_servers(&config.servers).await;

    // ── LLM providers ────────────────────────────────────────────────
    let providers = Arc::new(
        ProviderRegistry::from_config(&config.providers).context("initializing LLM providers")?,
    );
    if providers.is_empty() {
        tracing::warn!("no LLM providers configured — conversations will fail");
    }

    // ── Session management ───────────────────────────────────────────
    let state_dir = match &config.session.state_dir {
        Some(dir) => dir.clone(),
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            discover_state_dir(&cwd)
        }
    };
    let store = Arc::new(SessionStore::new(&state_dir).context("initializing session store")?);
    let registry = Arc::new(SessionRegistry::new());
    let roles = Arc::new(RoleLoader::new(config.session.roles_dir.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        store,
        providers,
        hub.clone(),
        catalog.clone(),
        roles,
        config.session.provider.clone(),
    ));

    Ok(App {
        catalog,
        hub,
        orchestrator,
    })
}
