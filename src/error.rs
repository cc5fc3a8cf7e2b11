//! Error types for the playlist agent
//!
//! Two layers of failure exist:
//! - [`ToolError`] is what a tool call produces when it cannot do its job. It is
//!   never fatal to the turn: the orchestrator writes it back into the
//!   conversation so the model can react.
//! - [`AgentError`] ends the turn (model unreachable, malformed history, ...).

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tower::BoxError;

/// Result type alias for turn-level operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Status family of a failed platform response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    Other,
}

impl UpstreamKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 => Self::BadRequest,
            _ => Self::Other,
        }
    }

    /// Human-readable cause shown to the model.
    pub fn cause(self) -> &'static str {
        match self {
            Self::Unauthorized => {
                "Spotify rejected the access token; the user needs to sign in again"
            }
            Self::Forbidden => "the user is not allowed to access or modify this resource",
            Self::NotFound => "the playlist or track does not exist",
            Self::BadRequest => "Spotify rejected the request parameters",
            Self::Other => "Spotify returned an unexpected error",
        }
    }
}

/// Failure of a single tool call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    /// No usable access token when the tool ran
    #[error("Missing Spotify access token. Please authenticate.")]
    AuthenticationRequired,

    /// Input rejected before any remote call
    #[error("invalid input: {0}")]
    Validation(String),

    /// Platform answered with a non-success status
    #[error("Spotify API error {status}: {message}")]
    Upstream {
        status: u16,
        kind: UpstreamKind,
        message: String,
    },

    /// Transport failure or unreadable response
    #[error("network error: {0}")]
    Network(String),

    /// Removal went through but the addition that followed failed
    #[error("removed {removed} tracks, then adding failed: {source}")]
    PartiallyApplied {
        removed: usize,
        snapshot_id: Option<String>,
        source: Box<ToolError>,
    },
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify a non-success status. `detail` is the platform's own message, if any.
    pub fn upstream(status: u16, detail: Option<&str>) -> Self {
        let kind = UpstreamKind::from_status(status);
        let message = match detail.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => format!("{} ({})", kind.cause(), d),
            None => kind.cause().to_string(),
        };
        Self::Upstream {
            status,
            kind,
            message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::Validation(_) => "validation_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Network(_) => "network_error",
            Self::PartiallyApplied { .. } => "partially_applied",
        }
    }

    /// Shape written into the conversation as the tool result.
    pub fn to_value(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            Self::Upstream { status, kind, .. } => {
                error["status"] = json!(status);
                error["cause"] = json!(kind);
            }
            Self::PartiallyApplied {
                removed,
                snapshot_id,
                source,
            } => {
                error["removed"] = json!(removed);
                if let Some(snapshot_id) = snapshot_id {
                    error["snapshotId"] = json!(snapshot_id);
                }
                error["failed"] = source.to_value()["error"].clone();
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

/// Turn-level failure.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Conversation payload does not fit the message model
    #[error("invalid message at index {index}: {message}")]
    InvalidMessage { index: usize, message: String },

    /// The inference endpoint failed
    #[error("model invocation failed: {0}")]
    Model(#[source] BoxError),

    /// A request could not be assembled
    #[error("OpenAI request error: {0}")]
    Request(#[from] async_openai::error::OpenAIError),

    /// A tool service failed outside the tool contract
    #[error("tool service failure: {0}")]
    Tool(#[source] BoxError),

    /// Configuration value could not be parsed
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event stream was dropped mid-turn
    #[error("turn cancelled: event stream dropped")]
    Cancelled,
}
