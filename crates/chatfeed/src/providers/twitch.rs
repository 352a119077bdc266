//! Twitch chat provider.
//!
//! Joins a channel anonymously using IRC over WebSocket and turns `PRIVMSG`
//! lines into chat messages. A dropped socket is re-established with
//! exponential backoff.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http_client::install_rustls_provider;
use crate::message::ChatMessage;
use crate::provider::{ChatProvider, MessageSink};

/// Twitch WebSocket IRC server URL
const TWITCH_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

const PROVIDER_NAME: &str = "Twitch";
const PROVIDER_SHORT_NAME: &str = "Tw";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Backoff settings for re-establishing a dropped IRC session.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

#[derive(Default)]
struct TwitchState {
    channel: Option<String>,
    /// Socket opened by `connect`, handed to the read task by `listen`
    stream: Option<WsStream>,
    shutdown: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Anonymous Twitch chat reader.
pub struct TwitchProvider {
    url: String,
    reconnect: ReconnectConfig,
    state: Mutex<TwitchState>,
}

impl Default for TwitchProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitchProvider {
    pub fn new() -> Self {
        Self::with_url(TWITCH_WS_URL)
    }

    /// Use a different IRC WebSocket endpoint.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            state: Mutex::new(TwitchState::default()),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[async_trait]
impl ChatProvider for TwitchProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn short_name(&self) -> &str {
        PROVIDER_SHORT_NAME
    }

    async fn connect(&self, config: &Config) -> Result<()> {
        let channel = normalize_channel(&config.twitch.channel);
        if channel.is_empty() {
            return Err(Error::misconfigured("missing TWITCH_CHANNEL"));
        }

        info!(channel = %channel, "Connecting to Twitch chat");
        install_rustls_provider();
        let stream = open_session(&self.url, &channel).await?;

        let mut state = self.state.lock();
        state.channel = Some(channel);
        state.stream = Some(stream);
        Ok(())
    }

    async fn listen(&self, sink: MessageSink) -> Result<()> {
        let mut state = self.state.lock();
        let (Some(stream), Some(channel)) = (state.stream.take(), state.channel.clone()) else {
            return Err(Error::transport("Twitch provider is not connected"));
        };

        let shutdown = CancellationToken::new();
        let session = Session {
            url: self.url.clone(),
            channel,
            reconnect: self.reconnect,
            sink,
        };
        state.task = Some(tokio::spawn(session.run(stream, shutdown.clone())));
        state.shutdown = Some(shutdown);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let (shutdown, task, stream) = {
            let mut state = self.state.lock();
            (state.shutdown.take(), state.task.take(), state.stream.take())
        };

        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        if let Some(task) = task
            && let Err(e) = task.await
            && e.is_panic()
        {
            error!(error = %e, "Twitch read task panicked");
        }
        // Connected but never listened.
        if let Some(mut stream) = stream {
            let _ = stream.close(None).await;
        }

        debug!("Disconnected from Twitch");
        Ok(())
    }
}

/// Why a read loop ended.
enum SessionEnd {
    Shutdown,
    SinkClosed,
    Lost,
}

/// State owned by the background read task.
struct Session {
    url: String,
    channel: String,
    reconnect: ReconnectConfig,
    sink: MessageSink,
}

impl Session {
    async fn run(self, mut stream: WsStream, shutdown: CancellationToken) {
        loop {
            match self.read_loop(&mut stream, &shutdown).await {
                SessionEnd::Shutdown | SessionEnd::SinkClosed => {
                    let _ = stream.close(None).await;
                    break;
                }
                SessionEnd::Lost => {
                    warn!(channel = %self.channel, "Twitch chat connection lost");
                }
            }

            match self.reconnect(&shutdown).await {
                Some(new_stream) => stream = new_stream,
                None => break,
            }
        }
        debug!(channel = %self.channel, "Twitch read task stopped");
    }

    async fn read_loop(&self, stream: &mut WsStream, shutdown: &CancellationToken) -> SessionEnd {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                            if let Some(end) = self.handle_line(stream, line).await {
                                return end;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if stream.send(Message::Pong(data)).await.is_err() {
                            return SessionEnd::Lost;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Twitch closed the WebSocket");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Twitch WebSocket error");
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                },
            }
        }
    }

    async fn handle_line(&self, stream: &mut WsStream, line: &str) -> Option<SessionEnd> {
        trace!(line, "Twitch IRC");

        if let Some(rest) = line.strip_prefix("PING") {
            let payload = rest.trim();
            let payload = if payload.is_empty() {
                ":tmi.twitch.tv"
            } else {
                payload
            };
            if let Err(e) = stream.send(Message::Text(format!("PONG {payload}").into())).await {
                warn!(error = %e, "Failed to answer Twitch PING");
                return Some(SessionEnd::Lost);
            }
            return None;
        }

        if is_reconnect_request(line) {
            info!("Twitch requested a reconnect");
            return Some(SessionEnd::Lost);
        }

        let message = parse_privmsg(line)?;
        if self.sink.send(message).is_err() {
            return Some(SessionEnd::SinkClosed);
        }
        None
    }

    async fn reconnect(&self, shutdown: &CancellationToken) -> Option<WsStream> {
        let mut delay = self.reconnect.base_delay_ms;

        for attempt in 1..=self.reconnect.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = shutdown.cancelled() => return None,
            }
            if self.sink.is_closed() {
                debug!(channel = %self.channel, "Message sink closed, not reconnecting");
                return None;
            }

            let result = tokio::select! {
                result = open_session(&self.url, &self.channel) => result,
                _ = shutdown.cancelled() => return None,
            };
            match result {
                Ok(stream) => {
                    info!(channel = %self.channel, attempt, "Reconnected to Twitch chat");
                    return Some(stream);
                }
                Err(e) => warn!(attempt, error = %e, "Twitch reconnect failed"),
            }

            delay = (delay * 2).min(self.reconnect.max_delay_ms);
        }

        error!(channel = %self.channel, "Max reconnect attempts reached for Twitch");
        None
    }
}

/// Open the socket and run the anonymous IRC handshake.
async fn open_session(url: &str, channel: &str) -> Result<WsStream> {
    let (mut stream, _) = connect_async(url).await?;
    for message in handshake_messages(channel) {
        stream.send(message).await?;
    }
    debug!(channel, "Joined Twitch channel");
    Ok(stream)
}

fn handshake_messages(channel: &str) -> Vec<Message> {
    vec![
        Message::Text("CAP REQ :twitch.tv/tags twitch.tv/commands".into()),
        Message::Text("PASS oauth:".into()),
        Message::Text(format!("NICK {}", generate_anonymous_nick()).into()),
        Message::Text(format!("JOIN #{channel}").into()),
    ]
}

/// Anonymous logins use a `justinfan` nick with a random suffix.
fn generate_anonymous_nick() -> String {
    let random_num: u32 = rand::random::<u32>() % 100000;
    format!("justinfan{}", random_num)
}

fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

fn is_reconnect_request(line: &str) -> bool {
    line.split(' ').nth(1) == Some("RECONNECT")
}

/// Parse a `PRIVMSG` line into a chat message.
///
/// Format: `@tags :user!user@user.tmi.twitch.tv PRIVMSG #channel :message`
fn parse_privmsg(line: &str) -> Option<ChatMessage> {
    let (tags, remaining) = match line.strip_prefix('@') {
        Some(tagged) => {
            let (tag_str, rest) = tagged.split_once(' ')?;
            (parse_tags(tag_str), rest)
        }
        None => (HashMap::new(), line),
    };

    let parts: Vec<&str> = remaining.splitn(4, ' ').collect();
    if parts.len() < 4 || parts[1] != "PRIVMSG" {
        return None;
    }

    let content = parts[3].strip_prefix(':').unwrap_or(parts[3]);
    let login = parts[0]
        .strip_prefix(':')
        .and_then(|s| s.split('!').next())
        .unwrap_or_default();

    let author = tags
        .get("display-name")
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| login.to_string());

    let mut message = ChatMessage::new(PROVIDER_NAME, PROVIDER_SHORT_NAME, author, content.trim());
    if let Some(sent_at) = tags.get("tmi-sent-ts").and_then(|ts| parse_sent_ts(ts)) {
        message = message.with_timestamp(sent_at);
    }
    Some(message)
}

fn parse_tags(tag_str: &str) -> HashMap<String, String> {
    tag_str
        .split(';')
        .filter_map(|tag| tag.split_once('='))
        .map(|(key, value)| (key.to_string(), unescape_tag_value(value)))
        .collect()
}

/// Undo IRCv3 tag value escaping.
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn parse_sent_ts(value: &str) -> Option<DateTime<Utc>> {
    let millis = value.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let line = "@badge-info=;badges=broadcaster/1;color=#FF0000;display-name=TestUser;emotes=;id=abc123;mod=0;room-id=12345;subscriber=0;tmi-sent-ts=1700000000000;turbo=0;user-id=67890;user-type= :testuser!testuser@testuser.tmi.twitch.tv PRIVMSG #channel :Hello world!";

        let msg = parse_privmsg(line).unwrap();
        assert_eq!(msg.provider, "Twitch");
        assert_eq!(msg.provider_short_name, "Tw");
        assert_eq!(msg.author_name, "TestUser");
        assert_eq!(msg.content, "Hello world!");
        assert_eq!(
            msg.timestamp,
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
    }

    #[test]
    fn test_parse_privmsg_without_tags() {
        let line = ":someone!someone@someone.tmi.twitch.tv PRIVMSG #channel :hi there";

        let msg = parse_privmsg(line).unwrap();
        assert_eq!(msg.author_name, "someone");
        assert_eq!(msg.content, "hi there");
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_parse_privmsg_keeps_colons_in_content() {
        let line = ":a!a@a.tmi.twitch.tv PRIVMSG #channel :time is 12:30";
        assert_eq!(parse_privmsg(line).unwrap().content, "time is 12:30");
    }

    #[test]
    fn test_parse_ignores_other_commands() {
        assert!(parse_privmsg("PING :tmi.twitch.tv").is_none());
        assert!(parse_privmsg(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!").is_none());
        assert!(
            parse_privmsg(
                "@room-id=1;tmi-sent-ts=1 :tmi.twitch.tv USERNOTICE #channel :subscribed"
            )
            .is_none()
        );
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"Hello\sWorld\:"), "Hello World;");
        assert_eq!(unescape_tag_value(r"back\\slash"), r"back\slash");
        assert_eq!(unescape_tag_value("plain"), "plain");
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel(" #SomeChannel "), "somechannel");
        assert_eq!(normalize_channel(""), "");
    }

    #[test]
    fn test_handshake_joins_channel() {
        let messages = handshake_messages("somechannel");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3], Message::Text("JOIN #somechannel".into()));
    }

    #[test]
    fn test_generate_anonymous_nick() {
        let nick = generate_anonymous_nick();
        assert!(nick.starts_with("justinfan"));
        assert!(nick.len() > 9);
    }

    #[test]
    fn test_reconnect_request() {
        assert!(is_reconnect_request(":tmi.twitch.tv RECONNECT"));
        assert!(!is_reconnect_request(":a!a@a.tmi.twitch.tv PRIVMSG #c :RECONNECT"));
    }

    #[tokio::test]
    async fn test_connect_requires_channel() {
        let provider = TwitchProvider::new();
        let result = provider.connect(&Config::default()).await;
        assert!(matches!(result, Err(Error::Misconfigured(_))));
    }

    #[tokio::test]
    async fn test_listen_before_connect_fails() {
        let provider = TwitchProvider::new();
        let (sink, _rx) = MessageSink::channel();
        assert!(provider.listen(sink).await.is_err());
        // Disconnect is idempotent even when nothing was acquired.
        provider.disconnect().await.unwrap();
        provider.disconnect().await.unwrap();
    }
}
