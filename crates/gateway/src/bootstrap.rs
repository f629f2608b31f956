//! Wiring shared by every subcommand: config validation, the settings
//! store, the capability registry and, for conversational commands, the
//! decision-maker and session manager.

use std::sync::Arc;

use anyhow::Context;

use cg_capabilities::{kinds, CapabilityRegistry};
use cg_domain::config::{Config, ConfigSeverity};
use cg_providers::{resolve_api_key, LlmProvider, OpenAiCompatProvider};
use cg_sessions::SessionManager;
use cg_settings::{SettingsStore, SqliteSettingsStore};

/// Log every config issue; fail when any of them is an error.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Open the settings store and register the configured capability kinds.
///
/// Administrative commands do not talk to the decision-maker, so a missing
/// API key only means capabilities that need it see an empty account key.
pub fn build_registry(config: &Config) -> anyhow::Result<CapabilityRegistry> {
    check_config(config)?;

    let store: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::open(&config.store.path)
            .with_context(|| format!("opening settings store {}", config.store.path.display()))?,
    );
    tracing::info!(path = %config.store.path.display(), "settings store ready");

    let account_key = resolve_api_key(&config.llm).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "no account key available to capabilities");
        String::new()
    });

    let kinds = kinds::builtin(&config.capabilities).context("building capability kinds")?;
    let registry = CapabilityRegistry::with_kinds(store, account_key, kinds)
        .context("registering capability kinds")?;
    tracing::info!(kinds = ?registry.list_kinds(), "capability registry ready");
    Ok(registry)
}

/// Everything `ask` and `chat` need.
pub fn build_session_manager(config: &Config) -> anyhow::Result<SessionManager> {
    let registry = build_registry(config)?;

    let api_key = resolve_api_key(&config.llm).context("resolving decision-maker API key")?;
    let provider: Arc<dyn LlmProvider> = Arc::new(
        OpenAiCompatProvider::with_key(&config.llm, api_key)
            .context("initializing decision-maker")?,
    );
    tracing::info!(
        provider = %provider.provider_id(),
        model = %provider.default_model(),
        "decision-maker ready"
    );

    Ok(SessionManager::new(
        registry,
        provider,
        config.orchestrator.clone(),
        &config.sessions,
    )
    .with_temperature(config.llm.temperature))
}
