//! Shared utility functions for provider adapters.

use cg_domain::config::LlmConfig;
use cg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key for the decision-maker.
///
/// Precedence:
/// 1. `api_key` field (plaintext, warned about)
/// 2. the environment variable named by `api_key_env`
/// 3. Error
pub fn resolve_api_key(cfg: &LlmConfig) -> Result<String> {
    if let Some(ref key) = cfg.api_key {
        tracing::warn!(
            "API key loaded from plaintext config field 'api_key'; prefer 'api_key_env'"
        );
        return Ok(key.clone());
    }

    if cfg.api_key_env.is_empty() {
        return Err(Error::Auth(
            "no API key configured: set 'api_key_env' or 'api_key' under [llm]".into(),
        ));
    }

    match std::env::var(&cfg.api_key_env) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(Error::Auth(format!(
            "environment variable '{}' not set or empty",
            cfg.api_key_env
        ))),
    }
}
