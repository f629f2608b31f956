//! The reserved terminal tool. Calling it ends the turn with a structured
//! answer.

use cg_domain::config::MissingCorrelationId;
use cg_domain::error::{Error, Result};
use cg_domain::tool::{ToolCall, ToolDefinition, FINAL_ANSWER_TOOL};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAnswer {
    pub output: String,
    pub correlation_id: Option<String>,
}

impl FinalAnswer {
    /// Apply the configured policy to an absent correlation id.
    pub fn with_policy(mut self, policy: MissingCorrelationId) -> Self {
        if self.correlation_id.is_none() && policy == MissingCorrelationId::Zero {
            self.correlation_id = Some("0".into());
        }
        self
    }
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: FINAL_ANSWER_TOOL.into(),
        description: "Return the final answer to the user.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "output": {
                    "type": "string",
                    "description": "The final answer to the user"
                },
                "correlation_id": {
                    "type": "string",
                    "description": "The message_id of the retrieved document the answer is \
                                    based on. Leave it empty when no document was used; never \
                                    invent one."
                }
            },
            "required": ["output"]
        }),
    }
}

#[derive(Deserialize)]
struct RawFinalAnswer {
    output: String,
    #[serde(default, alias = "message_id")]
    correlation_id: Option<Value>,
}

/// Parse the arguments of a final-answer call.
///
/// Empty strings and the placeholder `"0"` count as "no correlation id".
/// Anything that does not fit the schema is a [`Error::MalformedCall`].
pub fn parse(call: &ToolCall) -> Result<FinalAnswer> {
    let malformed = |message: String| Error::MalformedCall {
        tool: call.tool_name.clone(),
        call_id: call.call_id.clone(),
        message,
    };

    if let Value::String(raw) = &call.arguments {
        return Err(malformed(format!("arguments are not a JSON object: {raw}")));
    }
    let raw: RawFinalAnswer =
        serde_json::from_value(call.arguments.clone()).map_err(|e| malformed(e.to_string()))?;

    let correlation_id = match raw.correlation_id {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(malformed(format!(
                "correlation_id must be a string, got {other}"
            )))
        }
    }
    .filter(|id| !id.is_empty() && id != "0");

    Ok(FinalAnswer {
        output: raw.output,
        correlation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(arguments: Value) -> ToolCall {
        ToolCall {
            call_id: "c1".into(),
            tool_name: FINAL_ANSWER_TOOL.into(),
            arguments,
        }
    }

    #[test]
    fn parses_output_and_correlation_id() {
        let answer = parse(&call(json!({"output": "X", "correlation_id": "42"}))).unwrap();
        assert_eq!(answer.output, "X");
        assert_eq!(answer.correlation_id.as_deref(), Some("42"));
    }

    #[test]
    fn accepts_message_id_alias_and_numbers() {
        let answer = parse(&call(json!({"output": "X", "message_id": 1337}))).unwrap();
        assert_eq!(answer.correlation_id.as_deref(), Some("1337"));
    }

    #[test]
    fn placeholders_mean_absent() {
        for id in [json!(""), json!("0"), json!(0), json!(null)] {
            let answer = parse(&call(json!({"output": "X", "correlation_id": id}))).unwrap();
            assert_eq!(answer.correlation_id, None);
        }
    }

    #[test]
    fn missing_output_is_malformed() {
        let err = parse(&call(json!({"correlation_id": "1"}))).unwrap_err();
        assert!(matches!(err, Error::MalformedCall { ref call_id, .. } if call_id == "c1"));
    }

    #[test]
    fn raw_string_arguments_are_malformed() {
        assert!(matches!(
            parse(&call(Value::String("{oops".into()))),
            Err(Error::MalformedCall { .. })
        ));
    }

    #[test]
    fn zero_policy_fills_absent_ids_only() {
        let absent = FinalAnswer {
            output: "X".into(),
            correlation_id: None,
        };
        assert_eq!(
            absent.clone().with_policy(MissingCorrelationId::Zero).correlation_id.as_deref(),
            Some("0")
        );
        assert_eq!(absent.with_policy(MissingCorrelationId::Null).correlation_id, None);

        let present = FinalAnswer {
            output: "X".into(),
            correlation_id: Some("7".into()),
        };
        assert_eq!(
            present.with_policy(MissingCorrelationId::Zero).correlation_id.as_deref(),
            Some("7")
        );
    }

    #[test]
    fn schema_requires_output_only() {
        let def = definition();
        assert_eq!(def.name, "Response");
        assert_eq!(def.parameters["required"], json!(["output"]));
    }
}
