//! HTTP helpers shared by the built-in kinds.

use std::time::Duration;

use cg_domain::error::{Error, Result};
use serde_json::Value;

pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

pub(crate) fn client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(from_reqwest)
}

/// Send `req`, fail on a non-2xx status, and return the body as text.
pub(crate) async fn send_text(req: reqwest::RequestBuilder) -> Result<String> {
    let resp = req.send().await.map_err(from_reqwest)?;
    let status = resp.status();
    let body = resp.text().await.map_err(from_reqwest)?;
    if !status.is_success() {
        return Err(Error::Http(format!("HTTP {} - {}", status.as_u16(), truncate(&body, 200))));
    }
    Ok(body)
}

pub(crate) async fn send_json(req: reqwest::RequestBuilder) -> Result<Value> {
    let body = send_text(req).await?;
    Ok(serde_json::from_str(&body)?)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
