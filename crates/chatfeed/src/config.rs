//! Startup configuration.
//!
//! Parsed once from environment variables and shared read-only afterwards.
//!
//! Supported env vars:
//! - `CONNECT_TWITCH`, `TWITCH_CHANNEL`
//! - `CONNECT_YOUTUBE`, `YOUTUBE_API_KEY`, `YOUTUBE_CHANNEL_ID`, `YOUTUBE_QUERIES_PER_DAY`
//! - `OUTPUT_CHAT`
//! - `OUTPUT_WEBPAGE`, `OUTPUT_WEBPAGE_PORT`, `OUTPUT_WEBPAGE_SHORTEN_PROVIDER`,
//!   `OUTPUT_WEBPAGE_HIDE_PROVIDER`

use tracing::warn;

use crate::error::{Error, Result};

/// Default YouTube Data API daily query budget.
pub const DEFAULT_YOUTUBE_QUERIES_PER_DAY: u32 = 10_000;

/// Default port for the web page output.
pub const DEFAULT_WEBPAGE_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwitchConfig {
    pub enabled: bool,
    /// Channel to join, without the leading `#`
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoutubeConfig {
    pub enabled: bool,
    pub api_key: String,
    pub channel_id: String,
    /// Daily API budget used to derive the minimum polling interval
    pub queries_per_day: u32,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            channel_id: String::new(),
            queries_per_day: DEFAULT_YOUTUBE_QUERIES_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPageConfig {
    pub enabled: bool,
    pub port: u16,
    /// Show the abbreviated provider name
    pub shorten_provider: bool,
    /// Hide the provider column entirely
    pub hide_provider: bool,
}

impl Default for WebPageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_WEBPAGE_PORT,
            shorten_provider: false,
            hide_provider: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub twitch: TwitchConfig,
    pub youtube: YoutubeConfig,
    pub console: ConsoleConfig,
    pub webpage: WebPageConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let flag = |key: &str| parse_flag(key, lookup(key).as_deref());

        let queries_per_day = match get("YOUTUBE_QUERIES_PER_DAY").parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => DEFAULT_YOUTUBE_QUERIES_PER_DAY,
        };

        let port = match get("OUTPUT_WEBPAGE_PORT").parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => DEFAULT_WEBPAGE_PORT,
        };

        Self {
            twitch: TwitchConfig {
                enabled: flag("CONNECT_TWITCH"),
                channel: get("TWITCH_CHANNEL"),
            },
            youtube: YoutubeConfig {
                enabled: flag("CONNECT_YOUTUBE"),
                api_key: get("YOUTUBE_API_KEY"),
                channel_id: get("YOUTUBE_CHANNEL_ID"),
                queries_per_day,
            },
            console: ConsoleConfig {
                enabled: flag("OUTPUT_CHAT"),
            },
            webpage: WebPageConfig {
                enabled: flag("OUTPUT_WEBPAGE"),
                port,
                shorten_provider: flag("OUTPUT_WEBPAGE_SHORTEN_PROVIDER"),
                hide_provider: flag("OUTPUT_WEBPAGE_HIDE_PROVIDER"),
            },
        }
    }

    /// Check that every enabled component has its required settings.
    pub fn validate(&self) -> Result<()> {
        if self.twitch.enabled && self.twitch.channel.is_empty() {
            return Err(Error::misconfigured(
                "TWITCH_CHANNEL is required when CONNECT_TWITCH is enabled",
            ));
        }
        if self.youtube.enabled
            && (self.youtube.api_key.is_empty() || self.youtube.channel_id.is_empty())
        {
            return Err(Error::misconfigured(
                "YOUTUBE_API_KEY and YOUTUBE_CHANNEL_ID are required when CONNECT_YOUTUBE is enabled",
            ));
        }
        Ok(())
    }
}

/// Parse a boolean flag (`1`/`0`, `t`/`f`, `true`/`false` in common casings).
///
/// Unset or empty values are false; unrecognized values are false with a warning.
fn parse_flag(key: &str, value: Option<&str>) -> bool {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        other => {
            warn!(key, value = other, "Unrecognized boolean value, treating as false");
            false
        }
    }
}
