//! Built-in chat providers.

pub mod twitch;
pub mod youtube;

pub use twitch::{ReconnectConfig, TwitchProvider};
pub use youtube::{YoutubeProvider, next_poll_interval};
