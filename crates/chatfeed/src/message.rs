//! Chat message types.
//!
//! The normalized record every provider produces and every consumer receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat line from any platform.
///
/// Serialized with PascalCase keys; this is the JSON frame format the web page
/// script reads from the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatMessage {
    /// Display name of the provider (e.g. "Twitch")
    pub provider: String,
    /// Abbreviated provider name (e.g. "Tw")
    pub provider_short_name: String,
    /// When the message was sent, if the upstream reports it
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Display name of the author
    #[serde(default)]
    pub author_name: String,
}

impl ChatMessage {
    /// Create a new message without a timestamp.
    pub fn new(
        provider: impl Into<String>,
        provider_short_name: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            provider_short_name: provider_short_name.into(),
            timestamp: None,
            content: content.into(),
            author_name: author_name.into(),
        }
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Provider label to show, either the full or the abbreviated name.
    pub fn display_provider(&self, shorten: bool) -> &str {
        if shorten {
            &self.provider_short_name
        } else {
            &self.provider
        }
    }
}
