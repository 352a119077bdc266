mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatfeed::{
    Aggregator, Config, ConsumerKind, ConsumerRegistry, ProviderKind, ProviderRegistry,
};
use tracing::{debug, info, warn};

/// How long `stop` may take before the process exits anyway.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_dir = std::env::var_os("LOG_DIR").map(PathBuf::from);
    let _log_guard = logging::init_logging(log_dir.as_deref())?;

    let config = Config::from_env();
    config.validate()?;
    let config = Arc::new(config);

    let mut aggregator = build_aggregator(config)?;
    aggregator
        .start()
        .context("nothing to do, enable at least one provider and one output")?;
    info!("Chatfeed running, press Ctrl+C to stop");

    shutdown_signal().await;
    info!("Shutdown signal received, stopping...");

    if tokio::time::timeout(STOP_TIMEOUT, aggregator.stop())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = STOP_TIMEOUT.as_secs(),
            "Aggregator did not stop in time, exiting anyway"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Register every provider and output enabled in the configuration.
fn build_aggregator(config: Arc<Config>) -> chatfeed::Result<Aggregator> {
    let providers = ProviderRegistry::with_defaults();
    let consumers = ConsumerRegistry::with_defaults();
    debug!(
        providers = ?providers.kinds(),
        consumers = ?consumers.kinds(),
        "Registered component kinds"
    );
    let mut aggregator = Aggregator::new(config.clone());

    if config.twitch.enabled {
        aggregator.add_provider(providers.create(ProviderKind::Twitch)?)?;
    }
    if config.youtube.enabled {
        aggregator.add_provider(providers.create(ProviderKind::Youtube)?)?;
    }
    if config.console.enabled {
        aggregator.add_consumer(consumers.create(ConsumerKind::Console)?)?;
    }
    if config.webpage.enabled {
        aggregator.add_consumer(consumers.create(ConsumerKind::Webpage)?)?;
    }

    info!(
        providers = aggregator.provider_count(),
        consumers = aggregator.consumer_count(),
        "Configured aggregator"
    );
    Ok(aggregator)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
