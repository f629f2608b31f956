use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decide/act loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Limits and prompt for the decide/act loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of decision steps per turn.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: usize,
    /// Wall-clock budget per turn, checked between steps.
    #[serde(default = "d_max_execution_secs")]
    pub max_execution_secs: u64,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// What to report as the correlation id when the model cannot derive one.
    #[serde(default)]
    pub missing_correlation_id: MissingCorrelationId,
    /// Answer returned when a turn hits the iteration or time cutoff.
    #[serde(default = "d_cutoff_message")]
    pub cutoff_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            max_execution_secs: d_max_execution_secs(),
            system_prompt: d_system_prompt(),
            missing_correlation_id: MissingCorrelationId::Null,
            cutoff_message: d_cutoff_message(),
        }
    }
}

/// Correlation id reported when none is derivable from retrieved material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCorrelationId {
    /// No correlation id at all.
    #[default]
    Null,
    /// The literal `"0"`.
    Zero,
}

fn d_max_iterations() -> usize {
    30
}
fn d_max_execution_secs() -> u64 {
    60
}
fn d_system_prompt() -> String {
    "You are a helpful personal assistant. When possible return the final answer \
     using the tool Response, including the message_id of any retrieved document \
     as correlation_id. Never invent a correlation_id. Always reply in the user's \
     language."
        .into()
}
fn d_cutoff_message() -> String {
    "Sorry, I could not complete this request in time. Please try again or rephrase it.".into()
}
