// In-process stand-in for the cockpit backend: canned REST answers keyed by
// path+query and a WebSocket that forwards whatever the test pushes.
#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Clone)]
struct BackendState {
    responses: Arc<Mutex<HashMap<String, (StatusCode, String)>>>,
    hits: Arc<AtomicUsize>,
    frames: broadcast::Sender<String>,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    state: BackendState,
}

impl MockBackend {
    pub async fn start() -> Self {
        let (frames, _) = broadcast::channel(256);
        let state = BackendState {
            responses: Arc::new(Mutex::new(HashMap::new())),
            hits: Arc::new(AtomicUsize::new(0)),
            frames,
        };

        let app = Router::new()
            .route("/api/ws/ws", get(live_socket))
            .fallback(rest)
            .with_state(state.clone());

        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);

        Self { addr, state }
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond_json(&self, path: &str, body: Value) {
        self.respond_raw(path, StatusCode::OK, body.to_string());
    }

    pub fn respond_raw(&self, path: &str, status: StatusCode, body: impl Into<String>) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    /// Number of REST requests served so far.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Pushes a raw text frame to every connected socket.
    pub fn push(&self, frame: impl Into<String>) -> usize {
        self.state.frames.send(frame.into()).unwrap_or(0)
    }
}

async fn rest(State(state): State<BackendState>, uri: Uri) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let key = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    match state.responses.lock().unwrap().get(&key) {
        Some((status, body)) => (*status, body.clone()),
        None => (StatusCode::NOT_FOUND, r#"{"detail":"Not Found"}"#.to_string()),
    }
}

async fn live_socket(State(state): State<BackendState>, upgrade: WebSocketUpgrade) -> Response {
    // subscribe before the handshake completes so no pushed frame is missed
    let frames = state.frames.subscribe();
    upgrade.on_upgrade(move |socket| forward(socket, frames))
}

async fn forward(mut socket: WebSocket, mut frames: broadcast::Receiver<String>) {
    while let Ok(frame) = frames.recv().await {
        if socket.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
}
