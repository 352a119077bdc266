//! Chatfeed: live chat aggregation for streamers.
//!
//! This crate collects chat messages from several streaming platforms, merges
//! them into a single stream and fans that stream out to local outputs.
//!
//! ## Core Types
//!
//! - [`ChatMessage`] - A normalized chat line
//! - [`ChatProvider`] - Trait for platform-specific message sources
//! - [`ChatConsumer`] - Trait for message outputs
//! - [`Aggregator`] - Supervises providers and consumers and owns the merge stream
//!
//! ## Providers
//!
//! - [`providers::TwitchProvider`] - Anonymous Twitch IRC over WebSocket
//! - [`providers::YoutubeProvider`] - YouTube Live Chat polling
//!
//! ## Consumers
//!
//! - [`consumers::ConsoleConsumer`] - Prints every message to stdout
//! - [`consumers::WebPageConsumer`] - Serves an HTML page and broadcasts over WebSocket

pub mod aggregator;
pub mod config;
pub mod consumer;
pub mod consumers;
pub mod error;
pub mod http_client;
pub mod message;
pub mod provider;
pub mod providers;
pub mod registry;

pub use aggregator::{Aggregator, LifecycleState};
pub use config::Config;
pub use consumer::ChatConsumer;
pub use error::{Error, Result};
pub use message::ChatMessage;
pub use provider::{ChatProvider, MessageSink};
pub use registry::{ConsumerKind, ConsumerRegistry, ProviderKind, ProviderRegistry};
