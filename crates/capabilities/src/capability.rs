//! The three seams of the capability model.
//!
//! A [`CapabilityKind`] is the static descriptor registered once per
//! process. Resolving it for a user yields a live [`Capability`], which in
//! turn exposes one or more invocable [`Tool`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use cg_domain::error::{Error, Result};
use cg_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity parameter carrying the decision-maker account key.
pub const IDENTITY_ACCOUNT_KEY: &str = "account_key";
/// Identity parameter carrying the owning user's id.
pub const IDENTITY_USER_ID: &str = "user_id";

/// Identity parameters are filled in by the registry; user parameters come
/// from the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    Identity,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub source: ParameterSource,
}

impl ParameterSpec {
    pub const fn user(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            source: ParameterSource::User,
        }
    }

    pub const fn identity(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            source: ParameterSource::Identity,
        }
    }
}

pub fn is_identity_parameter(name: &str) -> bool {
    name == IDENTITY_ACCOUNT_KEY || name == IDENTITY_USER_ID
}

/// Parameter values handed to [`CapabilityKind::construct`]. Always carries
/// both identity values plus every declared user parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParams(BTreeMap<String, String>);

impl ResolvedParams {
    pub fn new(user_id: &str, account_key: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(IDENTITY_USER_ID.to_owned(), user_id.to_owned());
        map.insert(IDENTITY_ACCOUNT_KEY.to_owned(), account_key.to_owned());
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::InvalidParameter {
            key: key.to_owned(),
            message: "missing".into(),
        })
    }

    pub fn user_id(&self) -> &str {
        self.get(IDENTITY_USER_ID).unwrap_or_default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a tool invocation. Failures are text too, flagged `is_error`,
/// so the decision-maker can read them and adapt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Fold a fallible result into an output, prefixing the error text.
    pub fn from_result(result: Result<String>, error_prefix: &str) -> Self {
        match result {
            Ok(content) => Self::ok(content),
            Err(e) => Self::error(format!("{error_prefix}: {e}")),
        }
    }
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn name(&self) -> &str;

    /// Must not fail: every downstream problem comes back as
    /// [`ToolOutput::error`].
    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput;
}

/// Fetch a required string argument.
pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> std::result::Result<&'a str, ToolOutput> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::Number(_)) | Some(Value::Bool(_)) => Err(ToolOutput::error(format!(
            "argument '{key}' must be a string"
        ))),
        _ => Err(ToolOutput::error(format!("missing required argument '{key}'"))),
    }
}

/// JSON schema for a tool taking only string arguments, all required.
pub fn string_args_schema(fields: &[(&str, &str)]) -> Value {
    let mut properties = Map::new();
    for (name, description) in fields {
        properties.insert(
            (*name).to_owned(),
            serde_json::json!({"type": "string", "description": description}),
        );
    }
    let required: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live, per-user instance of a capability kind.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// Run a zero-argument administrative command. Only called with names
    /// listed by the owning kind's [`CapabilityKind::commands`].
    async fn run_command(&self, command: &str) -> Result<String> {
        Err(Error::Other(format!("command '{command}' is not supported")))
    }
}

/// Static descriptor and constructor for one pluggable capability kind.
#[async_trait::async_trait]
pub trait CapabilityKind: Send + Sync {
    /// Unique kind identifier, also the feature-flag name.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn parameters(&self) -> &'static [ParameterSpec];

    /// `(command, description)` pairs, independent of live state.
    fn commands(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Build a live instance. May perform network or disk setup and fail;
    /// the registry turns a failure into a skipped kind.
    async fn construct(&self, params: ResolvedParams) -> Result<Arc<dyn Capability>>;
}
