//! Registries of available providers and consumers.
//!
//! Each registry maps a kind to a constructor, so the binary can build the
//! components it needs from configuration without naming concrete types.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::consumer::ChatConsumer;
use crate::consumers::{ConsoleConsumer, WebPageConsumer};
use crate::error::{Error, Result};
use crate::provider::ChatProvider;
use crate::providers::{TwitchProvider, YoutubeProvider};

/// Provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Twitch,
    Youtube,
}

/// Consumer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConsumerKind {
    Console,
    Webpage,
}

type ProviderFactory = Box<dyn Fn() -> Arc<dyn ChatProvider> + Send + Sync>;
type ConsumerFactory = Box<dyn Fn() -> Arc<dyn ChatConsumer> + Send + Sync>;

/// Registry of provider constructors.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderKind::Twitch, || Arc::new(TwitchProvider::new()));
        registry.register(ProviderKind::Youtube, || Arc::new(YoutubeProvider::new()));
        registry
    }

    /// Register (or replace) the constructor for a kind.
    pub fn register<F>(&mut self, kind: ProviderKind, factory: F)
    where
        F: Fn() -> Arc<dyn ChatProvider> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Build a new provider of the given kind.
    pub fn create(&self, kind: ProviderKind) -> Result<Arc<dyn ChatProvider>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| Error::unknown_kind("provider", kind.to_string()))
    }

    /// Build a provider from its case-insensitive name.
    pub fn create_by_name(&self, name: &str) -> Result<Arc<dyn ChatProvider>> {
        let kind = ProviderKind::from_str(name.trim())
            .map_err(|_| Error::unknown_kind("provider", name))?;
        self.create(kind)
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.factories.keys().copied().collect()
    }
}

/// Registry of consumer constructors.
#[derive(Default)]
pub struct ConsumerRegistry {
    factories: HashMap<ConsumerKind, ConsumerFactory>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in consumers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ConsumerKind::Console, || Arc::new(ConsoleConsumer::new()));
        registry.register(ConsumerKind::Webpage, || Arc::new(WebPageConsumer::new()));
        registry
    }

    pub fn register<F>(&mut self, kind: ConsumerKind, factory: F)
    where
        F: Fn() -> Arc<dyn ChatConsumer> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn create(&self, kind: ConsumerKind) -> Result<Arc<dyn ChatConsumer>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| Error::unknown_kind("consumer", kind.to_string()))
    }

    pub fn create_by_name(&self, name: &str) -> Result<Arc<dyn ChatConsumer>> {
        let kind = ConsumerKind::from_str(name.trim())
            .map_err(|_| Error::unknown_kind("consumer", name))?;
        self.create(kind)
    }

    pub fn kinds(&self) -> Vec<ConsumerKind> {
        self.factories.keys().copied().collect()
    }
}
