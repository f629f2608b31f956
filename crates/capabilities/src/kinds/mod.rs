//! Built-in capability kinds.

pub mod duckduckgo;
pub mod googlesearch;
pub mod home_assistant;
pub mod movies;

use std::sync::Arc;

use cg_domain::config::CapabilitiesConfig;
use cg_domain::error::{Error, Result};

use crate::capability::CapabilityKind;

pub use duckduckgo::DuckDuckGoKind;
pub use googlesearch::GoogleSearchKind;
pub use home_assistant::HomeAssistantKind;
pub use movies::MoviesKind;

/// Instantiate the kinds listed in `cfg.kinds`, in that order.
pub fn builtin(cfg: &CapabilitiesConfig) -> Result<Vec<Arc<dyn CapabilityKind>>> {
    let timeout = cfg.http_timeout_ms;
    let max = cfg.max_lookup_results;
    cfg.kinds
        .iter()
        .map(|name| {
            let kind: Arc<dyn CapabilityKind> = match name.as_str() {
                home_assistant::KIND => Arc::new(HomeAssistantKind::new(
                    cfg.home_assistant.clone(),
                    timeout,
                    max,
                )?),
                duckduckgo::KIND => Arc::new(DuckDuckGoKind::new(timeout, max)?),
                googlesearch::KIND => Arc::new(GoogleSearchKind::new(timeout, max)?),
                movies::KIND => Arc::new(MoviesKind::new(timeout, max)?),
                other => return Err(Error::UnknownCapability(other.to_owned())),
            };
            Ok(kind)
        })
        .collect()
}
