//! Aggregator: supervises providers and consumers, merges and fans out messages.
//!
//! The aggregation follows this model:
//! - **Providers** each get a supervisor task: connect, listen, wait for
//!   shutdown, disconnect
//! - **Merge stream**: every provider publishes onto one shared channel; arrival
//!   order is the global order
//! - **Dispatcher**: a single task drains the merge stream and hands every
//!   message to every consumer in registration order
//! - **Consumers** get a task running their `start`
//!
//! Registration is frozen while running. `stop` cancels everything and waits
//! for every spawned task before returning.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::consumer::ChatConsumer;
use crate::error::{Error, Result};
use crate::message::ChatMessage;
use crate::provider::{ChatProvider, MessageSink};

/// Lifecycle of an [`Aggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    Stopping,
}

/// Handles owned while running.
struct RunningState {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Supervises providers and consumers and owns the merge stream.
pub struct Aggregator {
    config: Arc<Config>,
    providers: Vec<Arc<dyn ChatProvider>>,
    consumers: Vec<Arc<dyn ChatConsumer>>,
    state: LifecycleState,
    running: Option<RunningState>,
}

impl Aggregator {
    /// Create an idle aggregator with no providers or consumers.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            providers: Vec::new(),
            consumers: Vec::new(),
            state: LifecycleState::Idle,
            running: None,
        }
    }

    /// Register a provider. Rejected once started.
    pub fn add_provider(&mut self, provider: Arc<dyn ChatProvider>) -> Result<()> {
        if self.state != LifecycleState::Idle {
            warn!(provider = provider.name(), "Rejecting provider added after start");
            return Err(Error::AlreadyStarted);
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Register a consumer. Rejected once started.
    pub fn add_consumer(&mut self, consumer: Arc<dyn ChatConsumer>) -> Result<()> {
        if self.state != LifecycleState::Idle {
            warn!(consumer = consumer.name(), "Rejecting consumer added after start");
            return Err(Error::AlreadyStarted);
        }
        self.consumers.push(consumer);
        Ok(())
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Spawn provider supervisors, consumer start tasks and the dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(Error::AlreadyStarted);
        }
        if self.providers.is_empty() || self.consumers.is_empty() {
            return Err(Error::Empty);
        }

        let shutdown = CancellationToken::new();
        let (sink, rx) = MessageSink::channel();
        let mut tasks = Vec::with_capacity(self.providers.len() + self.consumers.len() + 1);

        for provider in &self.providers {
            tasks.push(tokio::spawn(supervise_provider(
                Arc::clone(provider),
                Arc::clone(&self.config),
                sink.clone(),
                shutdown.clone(),
            )));
        }
        // Only providers hold senders; the stream ends early if they all give up.
        drop(sink);

        for consumer in &self.consumers {
            let consumer = Arc::clone(consumer);
            let config = Arc::clone(&self.config);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = consumer.start(&config, shutdown).await {
                    error!(consumer = consumer.name(), error = %e, "Consumer failed to start");
                }
            }));
        }

        tasks.push(tokio::spawn(dispatch(
            rx,
            self.consumers.clone(),
            shutdown.clone(),
        )));

        info!(
            providers = self.providers.len(),
            consumers = self.consumers.len(),
            "Aggregator started"
        );

        self.running = Some(RunningState { shutdown, tasks });
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Signal shutdown and wait for every spawned task. No-op when idle.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = LifecycleState::Stopping;
        info!("Stopping aggregator");
        running.shutdown.cancel();

        for result in join_all(running.tasks).await {
            if let Err(e) = result
                && e.is_panic()
            {
                error!(error = %e, "Aggregator task panicked");
            }
        }

        self.state = LifecycleState::Idle;
        info!("Aggregator stopped");
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}

/// Drive one provider through its lifecycle.
async fn supervise_provider(
    provider: Arc<dyn ChatProvider>,
    config: Arc<Config>,
    sink: MessageSink,
    shutdown: CancellationToken,
) {
    let name = provider.name().to_string();

    let connected = tokio::select! {
        result = provider.connect(&config) => result,
        _ = shutdown.cancelled() => {
            debug!(provider = %name, "Shutdown requested while connecting");
            disconnect_provider(provider.as_ref()).await;
            return;
        }
    };

    if let Err(e) = connected {
        warn!(provider = %name, error = %e, "Failed to connect provider");
        return;
    }
    info!(provider = %name, "Provider connected");

    if let Err(e) = provider.listen(sink).await {
        warn!(provider = %name, error = %e, "Provider failed to listen");
    }

    shutdown.cancelled().await;
    info!(provider = %name, "Stopping provider");
    disconnect_provider(provider.as_ref()).await;
}

async fn disconnect_provider(provider: &dyn ChatProvider) {
    if let Err(e) = provider.disconnect().await {
        warn!(provider = provider.name(), error = %e, "Failed to disconnect provider");
    }
}

/// Drain the merge stream into every consumer.
async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<ChatMessage>,
    consumers: Vec<Arc<dyn ChatConsumer>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => deliver(&consumers, &message),
                None => {
                    debug!("All providers finished, dispatcher exiting");
                    return;
                }
            },
        }
    }

    // Close the stream and flush whatever providers managed to publish.
    rx.close();
    let mut drained = 0usize;
    while let Some(message) = rx.recv().await {
        deliver(&consumers, &message);
        drained += 1;
    }
    debug!(drained, "Dispatcher drained merge stream");
}

/// Hand one message to each consumer, isolating failures.
fn deliver(consumers: &[Arc<dyn ChatConsumer>], message: &ChatMessage) {
    for consumer in consumers {
        match std::panic::catch_unwind(AssertUnwindSafe(|| consumer.consume(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(consumer = consumer.name(), error = %e, "Consumer failed to handle message")
            }
            Err(_) => error!(consumer = consumer.name(), "Consumer panicked while handling message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopProvider;

    #[async_trait]
    impl ChatProvider for NoopProvider {
        fn name(&self) -> &str {
            "Noop"
        }

        fn short_name(&self) -> &str {
            "No"
        }

        async fn connect(&self, _config: &Config) -> Result<()> {
            Ok(())
        }

        async fn listen(&self, _sink: MessageSink) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoopConsumer;

    #[async_trait]
    impl ChatConsumer for NoopConsumer {
        fn name(&self) -> &str {
            "Noop"
        }

        async fn start(&self, _config: &Config, _shutdown: CancellationToken) -> Result<()> {
            Ok(())
        }

        fn consume(&self, _message: &ChatMessage) -> Result<()> {
            Ok(())
        }
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(Arc::new(Config::default()))
    }

    #[tokio::test]
    async fn test_start_without_providers_is_empty() {
        let mut agg = aggregator();
        agg.add_consumer(Arc::new(NoopConsumer)).unwrap();
        assert!(matches!(agg.start(), Err(Error::Empty)));
        assert_eq!(agg.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_start_without_consumers_is_empty() {
        let mut agg = aggregator();
        agg.add_provider(Arc::new(NoopProvider)).unwrap();
        assert!(matches!(agg.start(), Err(Error::Empty)));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut agg = aggregator();
        agg.add_provider(Arc::new(NoopProvider)).unwrap();
        agg.add_consumer(Arc::new(NoopConsumer)).unwrap();

        agg.start().unwrap();
        assert_eq!(agg.state(), LifecycleState::Running);
        assert!(matches!(agg.start(), Err(Error::AlreadyStarted)));

        agg.stop().await;
        assert_eq!(agg.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_registration_frozen_while_running() {
        let mut agg = aggregator();
        agg.add_provider(Arc::new(NoopProvider)).unwrap();
        agg.add_consumer(Arc::new(NoopConsumer)).unwrap();
        agg.start().unwrap();

        assert!(matches!(
            agg.add_provider(Arc::new(NoopProvider)),
            Err(Error::AlreadyStarted)
        ));
        assert!(matches!(
            agg.add_consumer(Arc::new(NoopConsumer)),
            Err(Error::AlreadyStarted)
        ));
        assert_eq!(agg.provider_count(), 1);
        assert_eq!(agg.consumer_count(), 1);

        agg.stop().await;
        agg.add_provider(Arc::new(NoopProvider)).unwrap();
        assert_eq!(agg.provider_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut agg = aggregator();
        agg.stop().await;
        agg.stop().await;
        assert_eq!(agg.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut agg = aggregator();
        agg.add_provider(Arc::new(NoopProvider)).unwrap();
        agg.add_consumer(Arc::new(NoopConsumer)).unwrap();

        agg.start().unwrap();
        agg.stop().await;
        agg.start().unwrap();
        agg.stop().await;
        assert_eq!(agg.state(), LifecycleState::Idle);
    }
}
