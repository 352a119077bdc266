//! Chat consumer trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::message::ChatMessage;

/// Trait for outputs that receive every aggregated message.
#[async_trait]
pub trait ChatConsumer: Send + Sync {
    /// Consumer name used in logs.
    fn name(&self) -> &str;

    /// Long-lived initialization, e.g. running an HTTP server.
    ///
    /// Runs concurrently with message delivery and may keep running until
    /// `shutdown` is cancelled.
    async fn start(&self, config: &Config, shutdown: CancellationToken) -> Result<()>;

    /// Receive one message.
    ///
    /// Called once per message, possibly concurrently with `start` and with
    /// itself. Must not block; consumers that do I/O should queue internally.
    fn consume(&self, message: &ChatMessage) -> Result<()>;
}
