/// Shared error type used across all Concierge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("settings store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("invalid parameter {key}: {message}")]
    InvalidParameter { key: String, message: String },

    #[error("capability {kind}: {message}")]
    Capability { kind: String, message: String },

    /// The decision-maker emitted a structured call whose arguments could
    /// not be interpreted. Fatal to the current turn.
    #[error("malformed call to {tool} ({call_id}): {message}")]
    MalformedCall {
        tool: String,
        call_id: String,
        message: String,
    },

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn capability(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Capability {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
