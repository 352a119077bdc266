//! Console output.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::consumer::ChatConsumer;
use crate::error::Result;
use crate::message::ChatMessage;

/// Prints every message to stdout as `[<provider>] <content>`.
#[derive(Debug, Default)]
pub struct ConsoleConsumer;

impl ConsoleConsumer {
    pub fn new() -> Self {
        Self
    }
}

/// Console line for a message.
pub fn format_line(message: &ChatMessage) -> String {
    format!("[{}] {}", message.provider, message.content)
}

#[async_trait]
impl ChatConsumer for ConsoleConsumer {
    fn name(&self) -> &str {
        "Console"
    }

    async fn start(&self, _config: &Config, _shutdown: CancellationToken) -> Result<()> {
        Ok(())
    }

    fn consume(&self, message: &ChatMessage) -> Result<()> {
        println!("{}", format_line(message));
        Ok(())
    }
}
