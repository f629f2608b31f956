//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract with
//! function calling.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};
use crate::util::{from_reqwest, resolve_api_key};
use cg_domain::config::LlmConfig;
use cg_domain::error::{Error, Result};
use cg_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use cg_domain::trace::TraceEvent;
use serde_json::Value;
use std::time::{Duration, Instant};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the `[llm]` config section.
    ///
    /// Fails when no API key can be resolved.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(cfg)?;
        Self::with_key(cfg, api_key)
    }

    /// Same as [`from_config`](Self::from_config) with an explicit key.
    pub fn with_key(cfg: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.provider_id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: cfg.model.clone(),
            client,
        })
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let text = msg.content.extract_all_text();
    let tool_calls: Vec<Value> = msg
        .tool_calls()
        .into_iter()
        .map(|call| {
            // A raw (unparsable) payload goes back verbatim.
            let arguments = match call.arguments {
                Value::String(raw) => raw,
                other => other.to_string(),
            };
            serde_json::json!({
                "id": call.call_id,
                "type": "function",
                "function": {
                    "name": call.tool_name,
                    "arguments": arguments,
                }
            })
        })
        .collect();

    let mut obj = serde_json::json!({"role": "assistant"});
    obj["content"] = if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatResponse {
        content,
        tool_calls: parse_openai_tool_calls(provider, message)?,
        usage: body.get("usage").and_then(parse_openai_usage),
        model,
        finish_reason,
    })
}

/// A `tool_calls` entry without an id or a function name fails the whole
/// response; dropping it would turn the step into an empty final answer.
fn parse_openai_tool_calls(provider: &str, message: &Value) -> Result<Vec<ToolCall>> {
    let Some(arr) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };
    arr.iter()
        .enumerate()
        .map(|(idx, tc)| {
            let func = tc.get("function");
            let tool_name = func
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let call_id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if call_id.is_empty() || tool_name.is_empty() {
                tracing::warn!(provider = %provider, index = idx, "tool call without id or name");
                return Err(Error::MalformedCall {
                    tool: tool_name,
                    call_id,
                    message: format!("tool_calls[{idx}] is missing an id or a function name"),
                });
            }
            let args_str = func
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            Ok(ToolCall {
                arguments: parse_arguments(&tool_name, args_str),
                call_id,
                tool_name,
            })
        })
        .collect()
}

/// Empty arguments mean "no arguments". Anything that is not valid JSON is
/// kept as a raw string so the caller can reject the call.
fn parse_arguments(tool_name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(tool = %tool_name, error = %e, "tool call arguments are not valid JSON");
            Value::String(raw.to_string())
        }
    }
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);
        let started = Instant::now();

        tracing::debug!(provider = %self.id, url = %url, tools = req.tools.len(), "chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let parsed = parse_chat_response(&self.id, &resp_json)?;

        TraceEvent::LlmRequest {
            provider: self.id.clone(),
            model: parsed.model.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: parsed.usage.map(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(parsed)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_response() {
        let body = json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let resp = parse_chat_response("openai", &body).unwrap();
        assert_eq!(resp.content, "hi");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn parses_tool_calls_in_order() {
        let body = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "a", "arguments": "{\"x\":1}"}},
                    {"id": "c2", "type": "function", "function": {"name": "b", "arguments": ""}}
                ]
            }}]
        });
        let resp = parse_chat_response("openai", &body).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].tool_name, "a");
        assert_eq!(resp.tool_calls[0].arguments, json!({"x": 1}));
        assert_eq!(resp.tool_calls[1].call_id, "c2");
        assert_eq!(resp.tool_calls[1].arguments, json!({}));
    }

    #[test]
    fn invalid_arguments_are_kept_raw() {
        let body = json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c1", "function": {"name": "a", "arguments": "{not json"}}
            ]}}]
        });
        let resp = parse_chat_response("openai", &body).unwrap();
        assert_eq!(resp.tool_calls[0].arguments, Value::String("{not json".into()));
    }

    #[test]
    fn call_without_id_fails_the_response() {
        let body = json!({
            "choices": [{"message": {"content": "", "tool_calls": [
                {"function": {"name": "Response", "arguments": "{\"output\":\"X\"}"}}
            ]}}]
        });
        let err = parse_chat_response("openai", &body).unwrap_err();
        assert!(matches!(err, Error::MalformedCall { ref tool, .. } if tool == "Response"));
    }

    #[test]
    fn call_without_name_fails_the_response() {
        let body = json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c1", "function": {"name": "a", "arguments": "{}"}},
                {"id": "c2", "function": {"arguments": "{}"}}
            ]}}]
        });
        let err = parse_chat_response("openai", &body).unwrap_err();
        assert!(matches!(err, Error::MalformedCall { ref call_id, .. } if call_id == "c2"));
    }

    #[test]
    fn missing_choices_is_provider_error() {
        let err = parse_chat_response("openai", &json!({"model": "x"})).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn assistant_calls_serialize_as_function_calls() {
        let calls = vec![ToolCall {
            call_id: "c1".into(),
            tool_name: "lookup".into(),
            arguments: json!({"q": "lights"}),
        }];
        let v = msg_to_openai(&Message::assistant_with_calls("", &calls));
        assert_eq!(v["role"], "assistant");
        assert!(v["content"].is_null());
        assert_eq!(v["tool_calls"][0]["id"], "c1");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "lookup");
        assert_eq!(v["tool_calls"][0]["function"]["arguments"], "{\"q\":\"lights\"}");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let v = msg_to_openai(&Message::tool_result("c9", "done"));
        assert_eq!(v, json!({"role": "tool", "tool_call_id": "c9", "content": "done"}));
    }

    #[test]
    fn body_includes_tools_and_model_override() {
        let provider = OpenAiCompatProvider::with_key(&LlmConfig::default(), "k").unwrap();
        let req = ChatRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "t".into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
            }],
            temperature: Some(0.0),
            model: Some("other-model".into()),
            ..Default::default()
        };
        let body = provider.build_chat_body(&req);
        assert_eq!(body["model"], "other-model");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["tools"][0]["function"]["name"], "t");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let cfg = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            request_timeout_ms: 2_000,
            ..Default::default()
        };
        let provider = OpenAiCompatProvider::with_key(&cfg, "k").unwrap();
        let err = provider
            .chat(&ChatRequest {
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_) | Error::Timeout(_)));
    }
}
