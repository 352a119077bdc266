//! Chatfeed error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting or delivering chat messages.
#[derive(Error, Debug)]
pub enum Error {
    /// A required setting is missing for an enabled component
    #[error("Configuration error: {0}")]
    Misconfigured(String),

    /// The upstream has no live broadcast, chat or channel to attach to
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Network or API failure talking to an upstream
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Writing a frame to a WebSocket client failed
    #[error("Broadcast write error: {0}")]
    BroadcastWrite(String),

    #[error("Already started")]
    AlreadyStarted,

    #[error("Aggregator needs at least one provider and one consumer")]
    Empty,

    #[error("Unknown {category} kind: {name}")]
    UnknownKind { category: &'static str, name: String },

    /// The merge sink has been closed by the aggregator
    #[error("Message sink closed")]
    SinkClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn unknown_kind(category: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownKind {
            category,
            name: name.into(),
        }
    }

    /// Whether the error is a (possibly transient) network failure.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http(_) | Self::WebSocket(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::transport("reset").is_transport());
        assert!(Error::Io(std::io::Error::other("broken pipe")).is_transport());
        assert!(!Error::unavailable("offline").is_transport());
        assert!(!Error::AlreadyStarted.is_transport());
    }

    #[test]
    fn test_unknown_kind_message() {
        let err = Error::unknown_kind("provider", "kick");
        assert_eq!(err.to_string(), "Unknown provider kind: kick");
    }
}
