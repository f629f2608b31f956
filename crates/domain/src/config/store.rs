use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Location of the per-user settings database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: d_path() }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("./production_database/settings.sqlite3")
}
