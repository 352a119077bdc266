//! YouTube Data API v3 response models (only the fields we read).

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `search.list`
#[derive(Debug, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    #[serde(default)]
    pub video_id: Option<String>,
}

/// `videos.list` with `part=liveStreamingDetails`
#[derive(Debug, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(default)]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    #[serde(default)]
    pub active_live_chat_id: Option<String>,
}

/// `liveChatMessages.list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub polling_interval_millis: u64,
    /// Set once the broadcast's chat has ended
    #[serde(default)]
    pub offline_at: Option<String>,
    #[serde(default)]
    pub items: Vec<LiveChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessage {
    #[serde(default)]
    pub snippet: LiveChatMessageSnippet,
    #[serde(default)]
    pub author_details: Option<AuthorDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageSnippet {
    #[serde(default)]
    pub display_message: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDetails {
    #[serde(default)]
    pub display_name: String,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_live_chat_page() {
        let body = r#"{
            "kind": "youtube#liveChatMessageListResponse",
            "nextPageToken": "GOfQ",
            "pollingIntervalMillis": 5086,
            "items": [
                {
                    "snippet": {
                        "type": "textMessageEvent",
                        "publishedAt": "2024-03-01T12:00:00.123+00:00",
                        "displayMessage": "hello"
                    },
                    "authorDetails": { "displayName": "Viewer" }
                },
                { "snippet": { "type": "sponsorOnlyModeStartedEvent" } }
            ]
        }"#;

        let page: LiveChatMessageListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("GOfQ"));
        assert_eq!(page.polling_interval_millis, 5086);
        assert!(page.offline_at.is_none());
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].snippet.display_message.as_deref(), Some("hello"));
        assert!(page.items[0].snippet.published_at.is_some());
        assert!(page.items[1].author_details.is_none());
    }

    #[test]
    fn test_parse_video_without_live_details() {
        let body = r#"{ "items": [ { "id": "abc" } ] }"#;
        let videos: VideoListResponse = serde_json::from_str(body).unwrap();
        assert!(videos.items[0].live_streaming_details.is_none());
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{ "error": { "code": 403, "message": "quota exceeded", "errors": [] } }"#;
        let err: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(err.error.code, 403);
        assert_eq!(err.error.message, "quota exceeded");
    }
}
