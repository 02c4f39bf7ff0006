// src/socket.rs
use crate::config::{CockpitConfig, ReconnectPolicy};
use crate::error::{ConfigError, SocketError};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 1024;

/// What a consumer gets from the live socket: decoded frames in receipt order
/// plus the connectivity flag.
pub struct LiveFeed {
    pub events: broadcast::Receiver<Value>,
    pub connected: watch::Receiver<bool>,
}

impl LiveFeed {
    pub fn new(events: broadcast::Receiver<Value>, connected: watch::Receiver<bool>) -> Self {
        Self { events, connected }
    }
}

struct Outlets {
    connected: watch::Sender<bool>,
    latest: watch::Sender<Option<Value>>,
    events: broadcast::Sender<Value>,
}

impl Outlets {
    fn deliver(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => {
                self.latest.send_replace(Some(message.clone()));
                // no subscribers is fine
                let _ = self.events.send(message);
            }
            Err(e) => warn!(error = %e, "dropping malformed socket frame"),
        }
    }
}

/// Owns exactly one live WebSocket connection, reconnecting with backoff
/// until closed.
pub struct SocketClient {
    url: Url,
    connected: watch::Receiver<bool>,
    latest: watch::Receiver<Option<Value>>,
    events: broadcast::Sender<Value>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), SocketError>>>,
}

impl SocketClient {
    /// Spawns the connection task on the current tokio runtime.
    pub fn connect(url: Url, policy: ReconnectPolicy) -> Self {
        let (connected_tx, connected) = watch::channel(false);
        let (latest_tx, latest) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let outlets = Outlets {
            connected: connected_tx,
            latest: latest_tx,
            events: events.clone(),
        };
        let task = tokio::spawn(run(url.clone(), policy, outlets, shutdown_rx));

        Self {
            url,
            connected,
            latest,
            events,
            shutdown,
            task: Some(task),
        }
    }

    pub fn from_config(config: &CockpitConfig) -> Result<Self, ConfigError> {
        Ok(Self::connect(config.websocket_url()?, config.reconnect.clone()))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Most recently received, successfully decoded message.
    pub fn latest(&self) -> Option<Value> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.events.subscribe()
    }

    pub fn feed(&self) -> LiveFeed {
        LiveFeed::new(self.subscribe(), self.connected())
    }

    /// Closes the connection and waits for the task to finish. Nothing is
    /// delivered after this returns.
    pub async fn close(mut self) -> Result<(), SocketError> {
        self.shutdown.send_replace(true);
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "socket task panicked");
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run(
    url: Url,
    policy: ReconnectPolicy,
    outlets: Outlets,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SocketError> {
    let mut attempt: u32 = 0;

    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }

        let connected = tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            handshake = tokio_tungstenite::connect_async(url.as_str()) => handshake,
        };

        match connected {
            Ok((stream, _)) => {
                attempt = 0;
                info!(%url, "live socket connected");
                outlets.connected.send_replace(true);

                let (mut sink, mut frames) = stream.split();
                let closed_locally = loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            let _ = sink.send(Message::Close(None)).await;
                            break true;
                        }
                        frame = frames.next() => match frame {
                            Some(Ok(Message::Text(text))) => outlets.deliver(&text),
                            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                                Ok(text) => outlets.deliver(text),
                                Err(e) => warn!(error = %e, "dropping non-utf8 socket frame"),
                            },
                            Some(Ok(Message::Close(reason))) => {
                                debug!(?reason, "server closed live socket");
                                break false;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "live socket read failed");
                                break false;
                            }
                            None => break false,
                        },
                    }
                };

                outlets.connected.send_replace(false);
                if closed_locally {
                    break Ok(());
                }
                warn!(%url, "live socket disconnected");
            }
            Err(e) => {
                let e = SocketError::from(e);
                warn!(%url, error = %e, "live socket connect failed");
            }
        }

        attempt += 1;
        if let Some(max) = policy.max_retries {
            if attempt > max {
                error!(%url, attempts = max, "giving up on live socket");
                break Err(SocketError::RetriesExhausted(max));
            }
        }

        let delay = policy.delay(attempt);
        debug!(attempt, ?delay, "reconnecting live socket");
        tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            _ = time::sleep(delay) => {}
        }
    };

    outlets.connected.send_replace(false);
    result
}
