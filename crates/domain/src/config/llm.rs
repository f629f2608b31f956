use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision-maker (chat / function-calling endpoint)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the OpenAI-compatible chat endpoint that acts
/// as the decision-maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Identifier used in logs and trace events.
    #[serde(default = "d_provider_id")]
    pub provider_id: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Plaintext key. Takes precedence over `api_key_env` but is warned about.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    /// Per-request HTTP timeout. A request in flight is never cancelled
    /// by the orchestrator's time budget, so this bounds each step.
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_id: d_provider_id(),
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            api_key: None,
            temperature: 0.0,
            request_timeout_ms: d_request_timeout_ms(),
        }
    }
}

fn d_provider_id() -> String {
    "openai".into()
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_request_timeout_ms() -> u64 {
    40_000
}
