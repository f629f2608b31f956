use serde::{Deserialize, Serialize};

/// Every capability kind compiled into the workspace.
pub const BUILTIN_CAPABILITY_KINDS: &[&str] =
    &["home_assistant", "duckduckgo", "googlesearch", "movies"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Capability kinds known to the registry, in resolution order.
    #[serde(default = "d_kinds")]
    pub kinds: Vec<String>,
    /// Timeout for outbound HTTP calls made by capability tools.
    #[serde(default = "d_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Maximum hits returned by keyword lookup tools.
    #[serde(default = "d_max_lookup_results")]
    pub max_lookup_results: usize,
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            kinds: d_kinds(),
            http_timeout_ms: d_http_timeout_ms(),
            max_lookup_results: d_max_lookup_results(),
            home_assistant: HomeAssistantConfig::default(),
        }
    }
}

/// Which Home Assistant entities are exposed to the assistant.
///
/// An entity is indexed when its id is listed in `entity_ids` or its
/// domain (the part before the dot) is in `allowed_domains`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default = "d_allowed_domains")]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            allowed_domains: d_allowed_domains(),
            entity_ids: Vec::new(),
        }
    }
}

fn d_kinds() -> Vec<String> {
    BUILTIN_CAPABILITY_KINDS.iter().map(|k| (*k).to_owned()).collect()
}
fn d_http_timeout_ms() -> u64 {
    15_000
}
fn d_max_lookup_results() -> usize {
    5
}
fn d_allowed_domains() -> Vec<String> {
    ["person", "light", "switch", "lock", "alarm_control_panel", "media_player"]
        .iter()
        .map(|d| (*d).to_owned())
        .collect()
}
