//! YouTube Live Chat provider.
//!
//! YouTube has no push API for live chat, so this provider polls
//! `liveChatMessages.list`. The poll interval is the larger of the interval
//! the server asks for and `24h / queries_per_day`, which keeps a full day of
//! polling inside the API key's quota.

mod models;

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http_client::build_http_client;
use crate::message::ChatMessage;
use crate::provider::{ChatProvider, MessageSink};

use models::{
    ApiErrorResponse, LiveChatMessage, LiveChatMessageListResponse, SearchListResponse,
    VideoListResponse,
};

/// YouTube Data API v3 base URL
const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Upper bound accepted by `liveChatMessages.list`
const MAX_RESULTS: &str = "2000";

const PROVIDER_NAME: &str = "Youtube";
const PROVIDER_SHORT_NAME: &str = "Yt";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Interval before the next `liveChatMessages.list` call.
pub fn next_poll_interval(server_interval_ms: u64, queries_per_day: u32) -> Duration {
    let quota_floor = Duration::from_secs(SECONDS_PER_DAY) / queries_per_day.max(1);
    Duration::from_millis(server_interval_ms).max(quota_floor)
}

/// Polling state for one live chat.
struct ChatSession {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    live_chat_id: String,
    queries_per_day: u32,
    next_page: Option<String>,
    next_poll: Duration,
}

#[derive(Default)]
struct YoutubeState {
    session: Option<ChatSession>,
    shutdown: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// YouTube Live Chat reader.
pub struct YoutubeProvider {
    base_url: String,
    state: Mutex<YoutubeState>,
}

impl Default for YoutubeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YoutubeProvider {
    pub fn new() -> Self {
        Self::with_base_url(YOUTUBE_API_URL)
    }

    /// Use a different API root (e.g. a local mock).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(YoutubeState::default()),
        }
    }

    /// Find the channel's active live broadcast.
    async fn find_live_video(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        channel_id: &str,
    ) -> Result<String> {
        let url = format!("{}/search", self.base_url);
        let response: SearchListResponse = get_json(
            client,
            &url,
            &[
                ("part", "id,snippet"),
                ("channelId", channel_id),
                ("eventType", "live"),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", api_key),
            ],
        )
        .await?;

        let item = response.items.into_iter().next().ok_or_else(|| {
            Error::unavailable(format!(
                "no active live broadcasts found for channel {channel_id}"
            ))
        })?;

        item.id
            .video_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::unavailable(format!("no live video id found for channel {channel_id}"))
            })
    }

    /// Resolve the live chat attached to a live video.
    async fn find_live_chat(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        video_id: &str,
    ) -> Result<String> {
        let url = format!("{}/videos", self.base_url);
        let response: VideoListResponse = get_json(
            client,
            &url,
            &[
                ("part", "liveStreamingDetails"),
                ("id", video_id),
                ("key", api_key),
            ],
        )
        .await?;

        let video = response.items.into_iter().next().ok_or_else(|| {
            Error::unavailable(format!("no live video details found for video {video_id}"))
        })?;

        let details = video.live_streaming_details.ok_or_else(|| {
            Error::unavailable(format!(
                "no live streaming details found for video {video_id}"
            ))
        })?;

        details
            .active_live_chat_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::unavailable(format!("no live chat found for video {video_id}")))
    }
}

#[async_trait]
impl ChatProvider for YoutubeProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn short_name(&self) -> &str {
        PROVIDER_SHORT_NAME
    }

    async fn connect(&self, config: &Config) -> Result<()> {
        let yt = &config.youtube;
        if yt.api_key.is_empty() || yt.channel_id.is_empty() {
            return Err(Error::misconfigured(
                "missing YOUTUBE_API_KEY or YOUTUBE_CHANNEL_ID",
            ));
        }

        info!(channel_id = %yt.channel_id, "Connecting to YouTube");
        let client = build_http_client()?;
        let video_id = self
            .find_live_video(&client, &yt.api_key, &yt.channel_id)
            .await?;
        let live_chat_id = self.find_live_chat(&client, &yt.api_key, &video_id).await?;
        info!(video_id = %video_id, live_chat_id = %live_chat_id, "Found YouTube live chat");

        self.state.lock().session = Some(ChatSession {
            client,
            base_url: self.base_url.clone(),
            api_key: yt.api_key.clone(),
            live_chat_id,
            queries_per_day: yt.queries_per_day,
            next_page: None,
            next_poll: Duration::ZERO,
        });
        Ok(())
    }

    async fn listen(&self, sink: MessageSink) -> Result<()> {
        let mut state = self.state.lock();
        let Some(session) = state.session.take() else {
            return Err(Error::transport("YouTube provider is not connected"));
        };

        let shutdown = CancellationToken::new();
        state.task = Some(tokio::spawn(session.poll(sink, shutdown.clone())));
        state.shutdown = Some(shutdown);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let (shutdown, task) = {
            let mut state = self.state.lock();
            state.session = None;
            (state.shutdown.take(), state.task.take())
        };

        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        if let Some(task) = task
            && let Err(e) = task.await
            && e.is_panic()
        {
            error!(error = %e, "YouTube poll task panicked");
        }

        debug!("Disconnected from YouTube");
        Ok(())
    }
}

impl ChatSession {
    async fn poll(mut self, sink: MessageSink, shutdown: CancellationToken) {
        loop {
            let result = tokio::select! {
                result = self.fetch_page() => result,
                _ = shutdown.cancelled() => break,
            };

            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, "Error getting YouTube live chat messages");
                    break;
                }
            };

            self.next_page = page.next_page_token;
            self.next_poll = next_poll_interval(page.polling_interval_millis, self.queries_per_day);
            debug!(
                items = page.items.len(),
                next_poll_ms = self.next_poll.as_millis() as u64,
                "Fetched YouTube live chat page"
            );

            for item in page.items {
                if sink.send(to_chat_message(item)).is_err() {
                    debug!("Message sink closed, stopping YouTube poll");
                    return;
                }
            }

            if page.offline_at.is_some() {
                info!(live_chat_id = %self.live_chat_id, "YouTube live chat has ended");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.next_poll) => {}
                _ = shutdown.cancelled() => break,
            }
            if sink.is_closed() {
                debug!("Message sink closed, stopping YouTube poll");
                break;
            }
        }
        debug!("YouTube poll task stopped");
    }

    async fn fetch_page(&self) -> Result<LiveChatMessageListResponse> {
        let url = format!("{}/liveChat/messages", self.base_url);
        let mut query = vec![
            ("liveChatId", self.live_chat_id.as_str()),
            ("part", "snippet,authorDetails"),
            ("maxResults", MAX_RESULTS),
            ("key", self.api_key.as_str()),
        ];
        if let Some(page) = self.next_page.as_deref().filter(|p| !p.is_empty()) {
            query.push(("pageToken", page));
        }
        get_json(&self.client, &url, &query).await
    }
}

fn to_chat_message(item: LiveChatMessage) -> ChatMessage {
    let author = item
        .author_details
        .map(|author| author.display_name)
        .unwrap_or_default();
    let content = item.snippet.display_message.unwrap_or_default();

    let message = ChatMessage::new(PROVIDER_NAME, PROVIDER_SHORT_NAME, author, content);
    match item.snippet.published_at {
        Some(published_at) => message.with_timestamp(published_at),
        None => message,
    }
}

/// GET a Data API endpoint and decode the JSON body.
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        warn!(%status, url, message = %message, "YouTube API request failed");

        return Err(match status {
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Error::unavailable(format!("YouTube API returned {status}: {message}"))
            }
            _ => Error::transport(format!("YouTube API returned {status}: {message}")),
        });
    }

    Ok(response.json::<T>().await?)
}
