//! YouTube provider against a local mock of the Data API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chatfeed::config::YoutubeConfig;
use chatfeed::providers::YoutubeProvider;
use chatfeed::{ChatProvider, Config, Error, MessageSink};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct MockApi {
    /// `search.list` returns no live video when set
    offline: bool,
    /// `videos.list` omits the live chat id when set
    no_chat: bool,
    /// Status for every request, e.g. quota errors
    fail_with: Option<StatusCode>,
    /// Pages returned by `liveChatMessages.list`, in order
    pages: Vec<Value>,
    /// (pageToken, time) of each `liveChatMessages.list` call
    polls: Mutex<Vec<(Option<String>, Instant)>>,
    search_params: Mutex<Option<HashMap<String, String>>>,
}

type Params = Query<HashMap<String, String>>;

async fn search(State(api): State<Arc<MockApi>>, Query(params): Params) -> impl IntoResponse {
    *api.search_params.lock() = Some(params);
    if let Some(status) = api.fail_with {
        return (
            status,
            Json(json!({ "error": { "code": status.as_u16(), "message": "quotaExceeded" } })),
        );
    }
    let items = if api.offline {
        json!([])
    } else {
        json!([{ "id": { "kind": "youtube#video", "videoId": "video123" } }])
    };
    (StatusCode::OK, Json(json!({ "items": items })))
}

async fn videos(State(api): State<Arc<MockApi>>, Query(params): Params) -> Json<Value> {
    assert_eq!(params.get("id").map(String::as_str), Some("video123"));
    if api.no_chat {
        return Json(json!({ "items": [{ "liveStreamingDetails": {} }] }));
    }
    Json(json!({
        "items": [{ "liveStreamingDetails": { "activeLiveChatId": "chat456" } }]
    }))
}

async fn messages(State(api): State<Arc<MockApi>>, Query(params): Params) -> Json<Value> {
    assert_eq!(params.get("liveChatId").map(String::as_str), Some("chat456"));
    let mut polls = api.polls.lock();
    polls.push((params.get("pageToken").cloned(), Instant::now()));
    let index = (polls.len() - 1).min(api.pages.len() - 1);
    Json(api.pages[index].clone())
}

async fn serve(api: MockApi) -> (String, Arc<MockApi>) {
    let api = Arc::new(api);
    let router = Router::new()
        .route("/search", get(search))
        .route("/videos", get(videos))
        .route("/liveChat/messages", get(messages))
        .with_state(api.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (format!("http://{addr}"), api)
}

fn config(queries_per_day: u32) -> Config {
    Config {
        youtube: YoutubeConfig {
            enabled: true,
            api_key: "test-key".to_string(),
            channel_id: "UC123".to_string(),
            queries_per_day,
        },
        ..Config::default()
    }
}

fn item(author: &str, text: &str) -> Value {
    json!({
        "snippet": { "displayMessage": text, "publishedAt": "2024-03-01T12:00:00Z" },
        "authorDetails": { "displayName": author }
    })
}

#[tokio::test]
async fn test_polls_pages_in_order() {
    let (base_url, api) = serve(MockApi {
        pages: vec![
            json!({ "nextPageToken": "p1", "pollingIntervalMillis": 0, "items": [item("a", "one"), item("b", "two")] }),
            json!({ "nextPageToken": "p2", "pollingIntervalMillis": 0, "items": [item("c", "three")] }),
            json!({ "nextPageToken": "p3", "pollingIntervalMillis": 0, "offlineAt": "2024-03-01T13:00:00Z", "items": [] }),
        ],
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    // 10ms between polls
    provider.connect(&config(8_640_000)).await.unwrap();

    let params = api.search_params.lock().clone().unwrap();
    assert_eq!(params["channelId"], "UC123");
    assert_eq!(params["eventType"], "live");
    assert_eq!(params["key"], "test-key");

    let (sink, mut rx) = MessageSink::channel();
    provider.listen(sink).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a chat message")
            .unwrap();
        received.push((message.author_name, message.content));
    }
    assert_eq!(
        received,
        vec![
            ("a".to_string(), "one".to_string()),
            ("b".to_string(), "two".to_string()),
            ("c".to_string(), "three".to_string()),
        ]
    );

    // The offline page ends polling
    tokio::time::sleep(Duration::from_millis(100)).await;
    provider.disconnect().await.unwrap();

    let tokens: Vec<_> = api.polls.lock().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(
        tokens,
        vec![None, Some("p1".to_string()), Some("p2".to_string())]
    );
}

#[tokio::test]
async fn test_poll_interval_respects_quota() {
    let page = json!({ "nextPageToken": "next", "pollingIntervalMillis": 1, "items": [] });
    let (base_url, api) = serve(MockApi {
        pages: vec![page],
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    // 86400s / 432000 = 200ms between polls
    provider.connect(&config(432_000)).await.unwrap();
    let (sink, _rx) = MessageSink::channel();
    provider.listen(sink).await.unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    provider.disconnect().await.unwrap();

    let polls = api.polls.lock();
    assert!(polls.len() >= 2, "expected several polls, got {}", polls.len());
    assert!(polls.len() <= 4, "polled too often: {}", polls.len());
    for pair in polls.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(gap >= Duration::from_millis(195), "polled after {gap:?}");
    }
}

#[tokio::test]
async fn test_polling_stops_when_sink_closes() {
    let page = json!({ "nextPageToken": "next", "pollingIntervalMillis": 0, "items": [] });
    let (base_url, api) = serve(MockApi {
        pages: vec![page],
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    // 10ms between polls
    provider.connect(&config(8_640_000)).await.unwrap();
    let (sink, rx) = MessageSink::channel();
    provider.listen(sink).await.unwrap();
    drop(rx);

    // Quiet pages never hit a failed send, so only the closed check ends the loop
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.polls.lock().len(), 1);
    provider.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_no_live_broadcast_is_unavailable() {
    let (base_url, api) = serve(MockApi {
        offline: true,
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    let err = provider.connect(&config(10_000)).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)), "got {err:?}");
    assert!(api.polls.lock().is_empty());
}

#[tokio::test]
async fn test_missing_live_chat_is_unavailable() {
    let (base_url, _api) = serve(MockApi {
        no_chat: true,
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    let err = provider.connect(&config(10_000)).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn test_quota_error_is_unavailable() {
    let (base_url, _api) = serve(MockApi {
        fail_with: Some(StatusCode::FORBIDDEN),
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    let err = provider.connect(&config(10_000)).await.unwrap_err();
    match err {
        Error::Unavailable(message) => assert!(message.contains("quotaExceeded")),
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let (base_url, _api) = serve(MockApi {
        fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..MockApi::default()
    })
    .await;

    let provider = YoutubeProvider::with_base_url(base_url);
    let err = provider.connect(&config(10_000)).await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}
