use serde::Serialize;

/// Structured trace events emitted across all Concierge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    CapabilityResolved {
        user_id: String,
        kind: String,
        tools: Vec<String>,
    },
    CapabilitySkipped {
        user_id: String,
        kind: String,
        reason: String,
    },
    SessionBuilt {
        user_id: String,
        tools: usize,
        capabilities: usize,
        rebuild: bool,
    },
    SessionEvicted {
        user_id: String,
    },
    SettingWritten {
        user_id: String,
        key: String,
    },
    FeatureToggled {
        user_id: String,
        kind: String,
        enabled: bool,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolInvoked {
        tool: String,
        call_id: String,
        is_error: bool,
        duration_ms: u64,
    },
    TurnCompleted {
        user_id: String,
        iterations: usize,
        duration_ms: u64,
        outcome: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cg_event");
    }
}
