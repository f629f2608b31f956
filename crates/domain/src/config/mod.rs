mod capabilities;
mod llm;
mod observability;
mod orchestrator;
mod sessions;
mod store;

pub use capabilities::*;
pub use llm::*;
pub use observability::*;
pub use orchestrator::*;
pub use sessions::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::error("llm.base_url", "base_url must not be empty"));
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError::error("llm.model", "model must not be empty"));
        }
        if self.llm.api_key.is_some() {
            errors.push(ConfigError::warning(
                "llm.api_key",
                "plaintext API key in config (prefer api_key_env)",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            errors.push(ConfigError::error(
                "llm.temperature",
                "temperature must be between 0.0 and 2.0",
            ));
        }

        // Both cutoffs must be positive or the loop could never run.
        if self.orchestrator.max_iterations == 0 {
            errors.push(ConfigError::error(
                "orchestrator.max_iterations",
                "max_iterations must be greater than 0",
            ));
        }
        if self.orchestrator.max_execution_secs == 0 {
            errors.push(ConfigError::error(
                "orchestrator.max_execution_secs",
                "max_execution_secs must be greater than 0",
            ));
        }
        if self.orchestrator.max_execution_secs * 1000 < self.llm.request_timeout_ms {
            errors.push(ConfigError::warning(
                "orchestrator.max_execution_secs",
                "time budget is shorter than a single LLM request timeout",
            ));
        }

        if self.sessions.memory_window == 0 {
            errors.push(ConfigError::warning(
                "sessions.memory_window",
                "memory_window = 0 disables conversation memory",
            ));
        }

        if self.store.path.as_os_str().is_empty() {
            errors.push(ConfigError::error("store.path", "path must not be empty"));
        }

        for (i, kind) in self.capabilities.kinds.iter().enumerate() {
            if !BUILTIN_CAPABILITY_KINDS.contains(&kind.as_str()) {
                errors.push(ConfigError::error(
                    &format!("capabilities.kinds[{i}]"),
                    format!(
                        "unknown capability kind \"{kind}\" (known: {})",
                        BUILTIN_CAPABILITY_KINDS.join(", ")
                    ),
                ));
            }
        }

        errors
    }
}
