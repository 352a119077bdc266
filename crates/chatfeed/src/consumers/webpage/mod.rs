//! Web page output.
//!
//! Serves a small HTML page at `/` and pushes every message to connected
//! browsers over a WebSocket at `/ws`. The last [`HISTORY_CAPACITY`] messages
//! are kept so that a freshly opened page is not empty.
//!
//! Delivery to clients happens on a dedicated drain task. `consume` only
//! records the message in the history and queues it, so the aggregator is
//! never blocked by a slow browser.
//!
//! Every message gets a sequence number when it enters the history. Each
//! registered client carries the sequence of the last message it was sent,
//! which lets a new client replay the history and then switch to live
//! delivery without gaps or duplicates.

mod history;
mod page;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::consumer::ChatConsumer;
use crate::error::{Error, Result};
use crate::message::ChatMessage;

pub use history::{HISTORY_CAPACITY, HistoryEntry, MessageHistory};
pub use page::{DisplayOptions, escape_html, render_page};

/// Pause between history frames sent to a new client.
const HISTORY_SEND_PAUSE: Duration = Duration::from_millis(10);

struct Client {
    sink: SplitSink<WebSocket, Message>,
    /// Sequence of the last message written to this client
    watermark: u64,
}

struct Shared {
    history: parking_lot::Mutex<MessageHistory>,
    queue_tx: mpsc::UnboundedSender<HistoryEntry>,
    /// Whether a drain task is reading the queue; only toggled under the history lock
    serving: AtomicBool,
    /// Held across socket writes, hence the async mutex
    clients: tokio::sync::Mutex<HashMap<u64, Client>>,
    next_client_id: AtomicU64,
}

#[derive(Clone)]
struct PageState {
    shared: Arc<Shared>,
    display: DisplayOptions,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Chat page served over HTTP with live WebSocket updates.
pub struct WebPageConsumer {
    shared: Arc<Shared>,
    /// Taken while the server runs, returned when it stops
    queue_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<HistoryEntry>>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl Default for WebPageConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebPageConsumer {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                history: parking_lot::Mutex::new(MessageHistory::default()),
                queue_tx,
                serving: AtomicBool::new(false),
                clients: tokio::sync::Mutex::new(HashMap::new()),
                next_client_id: AtomicU64::new(1),
            }),
            queue_rx: parking_lot::Mutex::new(Some(queue_rx)),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Address of the most recent successful bind.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of registered WebSocket clients.
    pub async fn client_count(&self) -> usize {
        self.shared.clients.lock().await.len()
    }

    /// Messages currently retained for new clients, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.shared.history.lock().messages()
    }

    fn set_serving(&self, serving: bool) {
        let _history = self.shared.history.lock();
        self.shared.serving.store(serving, Ordering::Release);
    }

    async fn serve(
        &self,
        listener: TcpListener,
        queue_rx: mpsc::UnboundedReceiver<HistoryEntry>,
        display: DisplayOptions,
        shutdown: CancellationToken,
    ) -> Result<()> {
        // Cancelled when the server stops for any reason, not only on shutdown
        let local = shutdown.child_token();
        let tracker = TaskTracker::new();

        self.set_serving(true);
        let drain = tokio::spawn(drain_queue(self.shared.clone(), queue_rx, local.clone()));

        let state = PageState {
            shared: self.shared.clone(),
            display,
            shutdown: local.clone(),
            tracker: tracker.clone(),
        };
        let router = Router::new()
            .route("/", get(index))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(local.clone().cancelled_owned())
            .await;

        local.cancel();
        tracker.close();
        tracker.wait().await;

        self.set_serving(false);
        match drain.await {
            Ok(mut queue_rx) => {
                // Undelivered entries stay in the history for the next run
                while queue_rx.try_recv().is_ok() {}
                *self.queue_rx.lock() = Some(queue_rx);
            }
            Err(e) => error!(error = %e, "Web page drain task failed"),
        }

        for (_, mut client) in self.shared.clients.lock().await.drain() {
            let _ = client.sink.close().await;
        }

        info!("Web page output stopped");
        served.map_err(Error::from)
    }
}

#[async_trait]
impl ChatConsumer for WebPageConsumer {
    fn name(&self) -> &str {
        "WebPage"
    }

    async fn start(&self, config: &Config, shutdown: CancellationToken) -> Result<()> {
        let Some(queue_rx) = self.queue_rx.lock().take() else {
            return Err(Error::AlreadyStarted);
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.webpage.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.queue_rx.lock() = Some(queue_rx);
                error!(%addr, error = %e, "Failed to bind web page output");
                return Err(e.into());
            }
        };

        let bound = match listener.local_addr() {
            Ok(bound) => bound,
            Err(e) => {
                *self.queue_rx.lock() = Some(queue_rx);
                return Err(e.into());
            }
        };
        *self.local_addr.lock() = Some(bound);
        info!("Web page output listening on http://{}", bound);

        self.serve(
            listener,
            queue_rx,
            DisplayOptions::from(&config.webpage),
            shutdown,
        )
        .await
    }

    fn consume(&self, message: &ChatMessage) -> Result<()> {
        let mut history = self.shared.history.lock();
        let entry = history.push(message.clone());
        // Queued under the history lock so queue order matches sequence order.
        // Without a drain task new clients catch up from the history instead.
        if self.shared.serving.load(Ordering::Acquire) {
            let _ = self.shared.queue_tx.send(entry);
        }
        Ok(())
    }
}

async fn index(State(state): State<PageState>) -> Html<String> {
    let messages = state.shared.history.lock().messages();
    Html(render_page(&messages, state.display))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<PageState>) -> impl IntoResponse {
    let tracker = state.tracker.clone();
    ws.on_upgrade(move |socket| tracker.track_future(handle_client(socket, state)))
}

async fn send_entry(sink: &mut SplitSink<WebSocket, Message>, entry: &HistoryEntry) -> Result<()> {
    let payload = serde_json::to_string(&entry.message)?;
    sink.send(Message::Text(payload.into()))
        .await
        .map_err(|e| Error::BroadcastWrite(e.to_string()))
}

async fn handle_client(socket: WebSocket, state: PageState) {
    let id = state.shared.next_client_id.fetch_add(1, Ordering::Relaxed);
    let (mut sender, mut receiver) = socket.split();

    // 1. Replay history outside the client-set lock
    let snapshot = state.shared.history.lock().snapshot();
    let mut watermark = 0;
    for entry in &snapshot {
        if let Err(e) = send_entry(&mut sender, entry).await {
            debug!(client = id, error = %e, "Failed to send history, client disconnected");
            return;
        }
        watermark = entry.seq;
        tokio::time::sleep(HISTORY_SEND_PAUSE).await;
    }

    // 2. Catch up and register; the drain task cannot broadcast meanwhile
    {
        let mut clients = state.shared.clients.lock().await;
        let missed = state.shared.history.lock().since(watermark);
        for entry in &missed {
            if let Err(e) = send_entry(&mut sender, entry).await {
                debug!(client = id, error = %e, "Failed to send history, client disconnected");
                return;
            }
            watermark = entry.seq;
        }
        clients.insert(
            id,
            Client {
                sink: sender,
                watermark,
            },
        );
        debug!(
            client = id,
            replayed = snapshot.len() + missed.len(),
            clients = clients.len(),
            "WebSocket client connected"
        );
    }

    // 3. Incoming data is ignored; reading only detects disconnects
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(client = id, error = %e, "WebSocket read error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    if let Some(mut client) = state.shared.clients.lock().await.remove(&id) {
        let _ = client.sink.close().await;
        debug!(client = id, "WebSocket client disconnected");
    }
}

async fn drain_queue(
    shared: Arc<Shared>,
    mut queue_rx: mpsc::UnboundedReceiver<HistoryEntry>,
    shutdown: CancellationToken,
) -> mpsc::UnboundedReceiver<HistoryEntry> {
    loop {
        let entry = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            entry = queue_rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };
        broadcast(&shared, &entry).await;
    }
    queue_rx
}

/// Write one message to every client that has not seen it yet.
async fn broadcast(shared: &Shared, entry: &HistoryEntry) {
    let payload = match serde_json::to_string(&entry.message) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Failed to serialize chat message");
            return;
        }
    };

    let mut clients = shared.clients.lock().await;
    let mut failed = Vec::new();
    for (id, client) in clients.iter_mut() {
        if client.watermark >= entry.seq {
            continue;
        }
        match client.sink.send(Message::Text(payload.clone().into())).await {
            Ok(()) => client.watermark = entry.seq,
            Err(e) => {
                let err = Error::BroadcastWrite(e.to_string());
                warn!(client = id, error = %err, "Evicting WebSocket client");
                failed.push(*id);
            }
        }
    }

    for id in failed {
        if let Some(mut client) = clients.remove(&id) {
            let _ = client.sink.close().await;
        }
    }
}
