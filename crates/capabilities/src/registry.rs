//! Capability registry: which kinds exist, which a user has enabled, and
//! resolution of a user's configuration into live instances and tools.
//!
//! Resolution never fails as a whole. A kind that is disabled, missing a
//! parameter, fails to construct, or would clash on a tool name is logged
//! and left out; the rest of the set still resolves.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cg_domain::error::{Error, Result};
use cg_domain::trace::TraceEvent;
use cg_settings::SettingsStore;

use crate::capability::{
    is_identity_parameter, Capability, CapabilityKind, ParameterSource, ResolvedParams, Tool,
};
use crate::toolset::ToolSet;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CapabilityRegistry {
    kinds: Vec<Arc<dyn CapabilityKind>>,
    store: Arc<dyn SettingsStore>,
    account_key: String,
}

impl CapabilityRegistry {
    pub fn new(store: Arc<dyn SettingsStore>, account_key: impl Into<String>) -> Self {
        Self {
            kinds: Vec::new(),
            store,
            account_key: account_key.into(),
        }
    }

    /// Register a kind. Kinds resolve in registration order.
    pub fn register(&mut self, kind: Arc<dyn CapabilityKind>) -> Result<()> {
        if self.kinds.iter().any(|k| k.name() == kind.name()) {
            return Err(Error::Config(format!(
                "capability kind '{}' registered twice",
                kind.name()
            )));
        }
        tracing::debug!(kind = %kind.name(), "capability kind registered");
        self.kinds.push(kind);
        Ok(())
    }

    pub fn with_kinds(
        store: Arc<dyn SettingsStore>,
        account_key: impl Into<String>,
        kinds: Vec<Arc<dyn CapabilityKind>>,
    ) -> Result<Self> {
        let mut registry = Self::new(store, account_key);
        for kind in kinds {
            registry.register(kind)?;
        }
        Ok(registry)
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    // ── Read operations ───────────────────────────────────────────

    pub fn list_kinds(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.name()).collect()
    }

    pub fn kind(&self, name: &str) -> Result<&Arc<dyn CapabilityKind>> {
        self.kinds
            .iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| Error::UnknownCapability(name.to_owned()))
    }

    /// `{name: description}` of the parameters a user must supply.
    pub fn required_parameters(&self, kind: &str) -> Result<BTreeMap<String, String>> {
        let kind = self.kind(kind)?;
        Ok(kind
            .parameters()
            .iter()
            .filter(|p| p.source == ParameterSource::User)
            .map(|p| (p.name.to_owned(), p.description.to_owned()))
            .collect())
    }

    /// Persisted flag per kind, regardless of whether the kind resolves.
    pub fn status(&self, user_id: &str) -> Result<BTreeMap<String, bool>> {
        self.kinds
            .iter()
            .map(|k| Ok((k.name().to_owned(), self.store.is_enabled(user_id, k.name())?)))
            .collect()
    }

    // ── Mutations ─────────────────────────────────────────────────

    /// Persist `params` and turn the kind on. Identity parameter names are
    /// never stored. The caller is responsible for rebuilding the session.
    pub fn enable(
        &self,
        user_id: &str,
        kind: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<()> {
        let kind = self.kind(kind)?;
        for (key, value) in params {
            if is_identity_parameter(key) {
                tracing::warn!(user_id = %user_id, key = %key, "ignoring identity parameter");
                continue;
            }
            if !kind.parameters().iter().any(|p| p.name == key) {
                tracing::debug!(
                    user_id = %user_id,
                    kind = %kind.name(),
                    key = %key,
                    "storing parameter not declared by kind"
                );
            }
            self.store.set_parameter(user_id, key, value)?;
        }
        self.store.set_enabled(user_id, kind.name(), true)
    }

    /// Turn the kind off. Stored parameters are kept.
    pub fn disable(&self, user_id: &str, kind: &str) -> Result<()> {
        let kind = self.kind(kind)?;
        self.store.set_enabled(user_id, kind.name(), false)
    }

    // ── Resolution ────────────────────────────────────────────────

    /// Resolve every enabled, fully parametrized kind for `user_id`.
    ///
    /// `base_tools` are placed first (e.g. document lookup); a kind whose
    /// tools clash with them or with an earlier kind is skipped.
    pub async fn resolve(&self, user_id: &str, base_tools: Vec<Arc<dyn Tool>>) -> ResolvedCapabilities {
        let mut resolved = ResolvedCapabilities::default();
        if let Err(name) = resolved.tools.try_extend(base_tools) {
            tracing::error!(user_id = %user_id, tool = %name, "duplicate base tool dropped set");
        }

        let settings = self.read_settings(user_id).await;
        for (kind, setting) in self.kinds.iter().zip(settings) {
            let name = kind.name();
            let params = match setting {
                KindSetting::Disabled => continue,
                KindSetting::Unusable(reason) => {
                    resolved.skip(user_id, name, reason);
                    continue;
                }
                KindSetting::Ready(params) => params,
            };

            let instance = match kind.construct(params).await {
                Ok(i) => i,
                Err(e) => {
                    resolved.skip(user_id, name, format!("construction failed: {e}"));
                    continue;
                }
            };

            let tools = instance.tools();
            let tool_names: Vec<String> = tools.iter().map(|t| t.name().to_owned()).collect();
            if let Err(clash) = resolved.tools.try_extend(tools) {
                resolved.skip(user_id, name, format!("tool name '{clash}' already taken"));
                continue;
            }

            TraceEvent::CapabilityResolved {
                user_id: user_id.to_owned(),
                kind: name.to_owned(),
                tools: tool_names,
            }
            .emit();
            resolved.live.push(LiveCapability {
                kind: kind.clone(),
                instance,
            });
        }

        resolved
    }

    /// Flags and parameters of every kind, in registration order. The
    /// store is synchronous, so the reads run on the blocking pool.
    async fn read_settings(&self, user_id: &str) -> Vec<KindSetting> {
        let store = self.store.clone();
        let kinds = self.kinds.clone();
        let account_key = self.account_key.clone();
        let user = user_id.to_owned();

        let read = tokio::task::spawn_blocking(move || {
            kinds
                .iter()
                .map(|kind| read_setting(store.as_ref(), &account_key, &user, kind.as_ref()))
                .collect::<Vec<_>>()
        })
        .await;

        read.unwrap_or_else(|e| {
            tracing::error!(user_id = %user_id, error = %e, "settings read task failed");
            self.kinds
                .iter()
                .map(|_| KindSetting::Unusable(format!("cannot read settings: {e}")))
                .collect()
        })
    }
}

enum KindSetting {
    Disabled,
    Unusable(String),
    Ready(ResolvedParams),
}

fn read_setting(
    store: &dyn SettingsStore,
    account_key: &str,
    user_id: &str,
    kind: &dyn CapabilityKind,
) -> KindSetting {
    match store.is_enabled(user_id, kind.name()) {
        Ok(true) => {}
        Ok(false) => return KindSetting::Disabled,
        Err(e) => return KindSetting::Unusable(format!("cannot read feature flag: {e}")),
    }

    let mut params = ResolvedParams::new(user_id, account_key);
    for spec in kind.parameters() {
        if spec.source == ParameterSource::Identity {
            continue;
        }
        match store.get_parameter(user_id, spec.name) {
            Ok(Some(value)) if !value.is_empty() => params.insert(spec.name, value),
            Ok(_) => return KindSetting::Unusable(format!("missing parameter '{}'", spec.name)),
            Err(e) => {
                return KindSetting::Unusable(format!("cannot read parameter '{}': {e}", spec.name))
            }
        }
    }
    KindSetting::Ready(params)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct LiveCapability {
    kind: Arc<dyn CapabilityKind>,
    instance: Arc<dyn Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCapability {
    pub kind: String,
    pub reason: String,
}

/// Outcome of an administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(String),
    /// The kind did not resolve in the latest rebuild.
    NotLive,
    UnknownCommand,
    Failed(String),
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Completed(msg) if msg.is_empty() => write!(f, "completed"),
            CommandOutcome::Completed(msg) => write!(f, "completed: {msg}"),
            CommandOutcome::NotLive => write!(f, "capability is not active"),
            CommandOutcome::UnknownCommand => write!(f, "unknown command"),
            CommandOutcome::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Live instances and the flat tool set for one user, as of one resolution.
#[derive(Default)]
pub struct ResolvedCapabilities {
    live: Vec<LiveCapability>,
    tools: ToolSet,
    skipped: Vec<SkippedCapability>,
}

impl ResolvedCapabilities {
    fn skip(&mut self, user_id: &str, kind: &str, reason: String) {
        tracing::warn!(user_id = %user_id, kind = %kind, reason = %reason, "skipping capability");
        TraceEvent::CapabilitySkipped {
            user_id: user_id.to_owned(),
            kind: kind.to_owned(),
            reason: reason.clone(),
        }
        .emit();
        self.skipped.push(SkippedCapability {
            kind: kind.to_owned(),
            reason,
        });
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn live_kinds(&self) -> Vec<&'static str> {
        self.live.iter().map(|l| l.kind.name()).collect()
    }

    pub fn is_live(&self, kind: &str) -> bool {
        self.live.iter().any(|l| l.kind.name() == kind)
    }

    pub fn skipped(&self) -> &[SkippedCapability] {
        &self.skipped
    }

    /// `{kind: {command: description}}` for live kinds only.
    pub fn available_commands(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.live
            .iter()
            .map(|l| {
                let commands = l
                    .kind
                    .commands()
                    .iter()
                    .map(|(name, desc)| ((*name).to_owned(), (*desc).to_owned()))
                    .collect();
                (l.kind.name().to_owned(), commands)
            })
            .collect()
    }

    pub async fn invoke_command(&self, kind: &str, command: &str) -> CommandOutcome {
        let Some(live) = self.live.iter().find(|l| l.kind.name() == kind) else {
            tracing::warn!(kind = %kind, command = %command, "command on inactive capability");
            return CommandOutcome::NotLive;
        };
        if !live.kind.commands().iter().any(|(name, _)| *name == command) {
            return CommandOutcome::UnknownCommand;
        }

        tracing::info!(kind = %kind, command = %command, "running capability command");
        match live.instance.run_command(command).await {
            Ok(msg) => CommandOutcome::Completed(msg),
            Err(e) => {
                tracing::warn!(kind = %kind, command = %command, error = %e, "capability command failed");
                CommandOutcome::Failed(e.to_string())
            }
        }
    }
}

impl fmt::Debug for ResolvedCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCapabilities")
            .field("live", &self.live_kinds())
            .field("tools", &self.tools)
            .field("skipped", &self.skipped)
            .finish()
    }
}
