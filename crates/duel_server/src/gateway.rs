//! WebSocket endpoint for live play.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use crate::coordinator::{Envelope, MatchCoordinator};
use crate::protocol::{self, AckFrame, Reply};
use crate::room::ConnectionId;
use crate::server::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SEND_QUEUE: usize = 64;

/// Outbound queues of every open connection.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    senders: Mutex<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl ConnectionHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id and outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(SEND_QUEUE);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        (id, rx)
    }

    /// Drops a connection's queue.
    pub fn unregister(&self, id: ConnectionId) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues a frame for one connection. Drops it if the queue is full or closed.
    pub fn send_to(&self, id: ConnectionId, text: String) -> bool {
        let Some(tx) = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
        else {
            trace!(%id, "No queue for connection");
            return false;
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%id, "Send queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn send_json<T: Serialize>(&self, id: ConnectionId, frame: &T) {
        match serde_json::to_string(frame) {
            Ok(text) => {
                self.send_to(id, text);
            }
            Err(e) => warn!(error = %e, "Failed to encode frame"),
        }
    }

    /// Delivers each event to its recipients.
    pub fn deliver(&self, envelopes: &[Envelope]) {
        for envelope in envelopes {
            match serde_json::to_string(&envelope.event) {
                Ok(text) => {
                    for id in &envelope.to {
                        self.send_to(*id, text.clone());
                    }
                    debug!(
                        event = envelope.event.event_name(),
                        recipients = envelope.to.len(),
                        "Event delivered"
                    );
                }
                Err(e) => warn!(error = %e, "Failed to encode event"),
            }
        }
    }
}

/// Parses frames, runs them through the coordinator and relays the results.
#[derive(Debug, Clone)]
pub struct Gateway {
    coordinator: MatchCoordinator,
    hub: Arc<ConnectionHub>,
}

impl Gateway {
    /// Creates a gateway.
    pub fn new(coordinator: MatchCoordinator, hub: Arc<ConnectionHub>) -> Self {
        Self { coordinator, hub }
    }

    /// The connection hub.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Handles one text frame from `connection`.
    #[instrument(skip(self, text))]
    pub async fn dispatch(&self, connection: ConnectionId, text: &str) {
        let inbound = match protocol::parse_frame(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Rejected frame");
                self.hub.send_json(connection, &AckFrame::new(None, &Reply::invalid(&e)));
                return;
            }
        };

        let event = inbound.message.event_name();
        let ack = inbound.ack;
        debug!(event, ?ack, "Dispatching intent");

        match self.coordinator.handle(connection, inbound.message).await {
            Ok(outcome) => {
                if let Some(reply) = outcome.reply.or_else(|| ack.map(|_| Reply::ok())) {
                    self.hub.send_json(connection, &AckFrame::new(ack, &reply));
                }
                self.hub.deliver(&outcome.events);
            }
            Err(e) => {
                warn!(event, code = e.code(), reason = %e, "Intent rejected");
                self.hub
                    .send_json(connection, &AckFrame::new(ack, &Reply::rejected(&e)));
            }
        }
    }

    /// Runs disconnect handling for a closed connection.
    #[instrument(skip(self))]
    pub async fn close(&self, connection: ConnectionId) {
        let outcome = self.coordinator.disconnect(connection).await;
        self.hub.deliver(&outcome.events);
        self.hub.unregister(connection);
    }
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway.clone()))
}

async fn handle_socket(socket: WebSocket, gateway: Gateway) {
    let (connection, mut rx) = gateway.hub.register();
    info!(%connection, open = gateway.hub.len(), "Connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => gateway.dispatch(connection, text.as_str()).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    gateway.close(connection).await;
    writer.abort();
    info!(%connection, "Connection closed");
}
