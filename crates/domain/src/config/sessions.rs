use serde::{Deserialize, Serialize};

/// Per-user session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Number of past exchanges (user query + final answer) kept as memory.
    #[serde(default = "d_memory_window")]
    pub memory_window: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            memory_window: d_memory_window(),
        }
    }
}

fn d_memory_window() -> usize {
    10
}
