//! Chat provider trait and the merge sink providers publish onto.
//!
//! Defines the interface for platform-specific chat providers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::ChatMessage;

/// Write side of the aggregator's merge stream.
///
/// Unbounded from the provider's point of view: `send` never waits. Once the
/// aggregator closes the stream every send fails with [`Error::SinkClosed`],
/// which providers should treat as a request to stop producing.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl MessageSink {
    /// Create a sink and the receiving half the dispatcher drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish a message onto the merge stream.
    pub fn send(&self, message: ChatMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::SinkClosed)
    }

    /// Whether the aggregator has stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Trait for platform-specific chat providers.
///
/// Lifecycle: constructed, then `connect`, then `listen`, then `disconnect`.
/// A provider owns whatever background tasks it needs to produce messages.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Display name, e.g. "Twitch".
    fn name(&self) -> &str;

    /// Abbreviated name, e.g. "Tw".
    fn short_name(&self) -> &str;

    /// Acquire upstream resources (connection, API handle, chat identifier).
    async fn connect(&self, config: &Config) -> Result<()>;

    /// Start delivering messages onto `sink`.
    ///
    /// Returns once delivery is arranged; production happens on tasks owned
    /// by the provider.
    async fn listen(&self, sink: MessageSink) -> Result<()>;

    /// Release upstream resources. Idempotent.
    ///
    /// No further messages are sent to the sink once this returns.
    async fn disconnect(&self) -> Result<()>;
}
