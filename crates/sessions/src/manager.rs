//! The session table and everything callers do through it.
//!
//! Every mutation of a user's capability configuration (enable, disable,
//! command) is applied while holding that user's slot and ends with a full
//! rebuild: fresh resolution, fresh tool set, fresh orchestrator, same
//! memory. A turn in flight holds the same slot, so a rebuild waits for it
//! and the turn only ever sees one tool set.

use std::collections::BTreeMap;
use std::sync::Arc;

use cg_capabilities::{
    CapabilityRegistry, CommandOutcome, DocumentIndex, DocumentLookupTool, ResolvedCapabilities,
    SkippedCapability, Tool,
};
use cg_domain::config::{OrchestratorConfig, SessionsConfig};
use cg_domain::error::Result;
use cg_domain::trace::TraceEvent;
use cg_providers::LlmProvider;
use cg_runtime::{ConversationMemory, Orchestrator, TurnReply};

use crate::slots::{SessionSlots, SlotGuard};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Session {
    memory: ConversationMemory,
    resolved: ResolvedCapabilities,
    orchestrator: Orchestrator,
}

/// Read-only view of a user's current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub user_id: String,
    pub tools: Vec<String>,
    pub live: Vec<String>,
    pub skipped: Vec<SkippedCapability>,
    pub memory_len: usize,
}

struct DocumentSource {
    index: Arc<dyn DocumentIndex>,
    limit: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionManager {
    registry: CapabilityRegistry,
    provider: Arc<dyn LlmProvider>,
    orchestrator: OrchestratorConfig,
    memory_window: usize,
    temperature: Option<f32>,
    documents: Option<DocumentSource>,
    slots: SessionSlots<Session>,
}

impl SessionManager {
    pub fn new(
        registry: CapabilityRegistry,
        provider: Arc<dyn LlmProvider>,
        orchestrator: OrchestratorConfig,
        sessions: &SessionsConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            orchestrator,
            memory_window: sessions.memory_window,
            temperature: None,
            documents: None,
            slots: SessionSlots::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Give every session a `document_lookup` tool over `index`,
    /// independent of feature flags.
    pub fn with_documents(mut self, index: Arc<dyn DocumentIndex>, limit: usize) -> Self {
        self.documents = Some(DocumentSource { index, limit });
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    // ── Turns ─────────────────────────────────────────────────────

    /// Run one turn for the user. Memory is committed only when the turn
    /// reaches a final answer; cutoffs and failures leave it untouched.
    pub async fn ask(&self, user_id: &str, query: &str) -> Result<TurnReply> {
        let mut guard = self.slots.acquire(user_id).await;
        let session = self.ensure(user_id, &mut guard).await;

        let reply = session
            .orchestrator
            .run(user_id, query, session.memory.messages())
            .await?;

        if reply.is_completed() {
            session.memory.commit(query, reply.answer.clone());
        } else {
            tracing::debug!(user_id = %user_id, "degraded turn not committed to memory");
        }
        Ok(reply)
    }

    /// The user's session, built on first request.
    pub async fn get_or_create(&self, user_id: &str) -> SessionSummary {
        let mut guard = self.slots.acquire(user_id).await;
        let session = self.ensure(user_id, &mut guard).await;
        summarize(user_id, session)
    }

    // ── Configuration ─────────────────────────────────────────────

    pub fn list_capabilities(&self) -> Vec<&'static str> {
        self.registry.list_kinds()
    }

    pub fn required_parameters(&self, kind: &str) -> Result<BTreeMap<String, String>> {
        self.registry.required_parameters(kind)
    }

    pub fn status(&self, user_id: &str) -> Result<BTreeMap<String, bool>> {
        self.registry.status(user_id)
    }

    pub async fn enable(
        &self,
        user_id: &str,
        kind: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<SessionSummary> {
        let mut guard = self.slots.acquire(user_id).await;
        self.registry.enable(user_id, kind, params)?;
        tracing::info!(user_id = %user_id, kind = %kind, "capability enabled");
        Ok(self.rebuild(user_id, &mut guard).await)
    }

    pub async fn disable(&self, user_id: &str, kind: &str) -> Result<SessionSummary> {
        let mut guard = self.slots.acquire(user_id).await;
        self.registry.disable(user_id, kind)?;
        tracing::info!(user_id = %user_id, kind = %kind, "capability disabled");
        Ok(self.rebuild(user_id, &mut guard).await)
    }

    /// `{kind: {command: description}}` for the user's live kinds.
    pub async fn available_commands(&self, user_id: &str) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut guard = self.slots.acquire(user_id).await;
        self.ensure(user_id, &mut guard).await.resolved.available_commands()
    }

    /// Run an administrative command on a live kind, then rebuild so the
    /// next turn sees whatever the command reloaded.
    pub async fn run_command(&self, user_id: &str, kind: &str, command: &str) -> Result<CommandOutcome> {
        self.registry.kind(kind)?;
        let mut guard = self.slots.acquire(user_id).await;
        let outcome = self
            .ensure(user_id, &mut guard)
            .await
            .resolved
            .invoke_command(kind, command)
            .await;
        self.rebuild(user_id, &mut guard).await;
        Ok(outcome)
    }

    // ── Table maintenance ─────────────────────────────────────────

    /// Drop the user's session, memory included. Waits for an in-flight
    /// turn or rebuild of that user to finish first.
    pub async fn evict(&self, user_id: &str) -> bool {
        let removed = self.slots.evict(user_id).await;
        if removed {
            TraceEvent::SessionEvicted {
                user_id: user_id.to_owned(),
            }
            .emit();
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.slots.len()
    }

    // ── Internals ─────────────────────────────────────────────────

    async fn ensure<'g>(&self, user_id: &str, guard: &'g mut SlotGuard<Session>) -> &'g mut Session {
        let session = match guard.take() {
            Some(session) => session,
            None => {
                let memory = ConversationMemory::new(self.memory_window);
                self.build(user_id, memory, false).await
            }
        };
        guard.insert(session)
    }

    async fn rebuild(&self, user_id: &str, guard: &mut SlotGuard<Session>) -> SessionSummary {
        let memory = guard
            .take()
            .map(|s| s.memory)
            .unwrap_or_else(|| ConversationMemory::new(self.memory_window));
        let session = self.build(user_id, memory, true).await;
        let summary = summarize(user_id, &session);
        **guard = Some(session);
        summary
    }

    async fn build(&self, user_id: &str, memory: ConversationMemory, rebuild: bool) -> Session {
        let mut base: Vec<Arc<dyn Tool>> = Vec::new();
        if let Some(docs) = &self.documents {
            base.push(Arc::new(DocumentLookupTool::new(docs.index.clone(), user_id, docs.limit)));
        }

        let resolved = self.registry.resolve(user_id, base).await;
        let mut orchestrator = Orchestrator::new(
            self.provider.clone(),
            resolved.tools().clone(),
            self.orchestrator.clone(),
        );
        if let Some(t) = self.temperature {
            orchestrator = orchestrator.with_temperature(t);
        }

        TraceEvent::SessionBuilt {
            user_id: user_id.to_owned(),
            tools: resolved.tools().len(),
            capabilities: resolved.live_kinds().len(),
            rebuild,
        }
        .emit();
        tracing::info!(
            user_id = %user_id,
            tools = ?resolved.tools().names(),
            rebuild,
            "session built"
        );

        Session {
            memory,
            resolved,
            orchestrator,
        }
    }
}

fn summarize(user_id: &str, session: &Session) -> SessionSummary {
    SessionSummary {
        user_id: user_id.to_owned(),
        tools: session.resolved.tools().names(),
        live: session
            .resolved
            .live_kinds()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        skipped: session.resolved.skipped().to_vec(),
        memory_len: session.memory.len(),
    }
}
