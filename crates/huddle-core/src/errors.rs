/// Errors produced by calls against the external bridge service.
/// The poller cares about exactly one distinction: a conflicting consumer
/// (another process holds the pull session) backs off longer than anything
/// else. Nothing here is fatal to the process.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("conflicting consumer on the update session: {0}")]
    Conflict(String),
    #[error("bridge api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected bridge response: {0}")]
    Decode(String),
    #[error("resource not found: {0}")]
    NotFound(String),
}

impl BridgeError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::Api { .. } => "api",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            409 => Self::Conflict(body),
            404 => Self::NotFound(body),
            _ => Self::Api { status, body },
        }
    }
}
