use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire events exchanged with chat clients over a room connection.
///
/// `reaction` and `read` bodies are free-form; their fields pass through a
/// flattened map so a rebroadcast preserves whatever the sender put in them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },
    Typing,
    Reaction {
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    Read {
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },
    /// Server to client only.
    Status {
        user: String,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Why an inbound frame could not be turned into a `ChatEvent`.
/// Any of these is a protocol error that ends the offending session.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("invalid JSON frame: {0}")]
    Json(String),
    #[error("frame has no \"type\" tag")]
    MissingTag,
    #[error("malformed \"{tag}\" frame: {reason}")]
    Malformed { tag: String, reason: String },
}

const KNOWN_TAGS: [&str; 6] = ["message", "typing", "reaction", "read", "image", "status"];

impl ChatEvent {
    /// Parse one inbound client frame.
    ///
    /// Returns `Ok(None)` for a well-formed frame with an unrecognized tag
    /// (ignored for forward compatibility) and `Err` for anything that is not
    /// a JSON object carrying a valid body for its tag.
    pub fn parse(raw: &str) -> Result<Option<ChatEvent>, EventParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| EventParseError::Json(e.to_string()))?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventParseError::MissingTag)?;
        if !KNOWN_TAGS.contains(&tag) {
            return Ok(None);
        }
        let tag = tag.to_owned();
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| EventParseError::Malformed { tag, reason: e.to_string() })
    }

    /// Wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Typing => "typing",
            Self::Reaction { .. } => "reaction",
            Self::Read { .. } => "read",
            Self::Image { .. } => "image",
            Self::Status { .. } => "status",
        }
    }
}
