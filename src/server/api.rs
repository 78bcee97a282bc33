use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::marker::Marker;
use crate::registry::Snapshot;
use crate::sync::protocol::{InboundEvent, OutboundEvent};

const HUB_CAPACITY: usize = 1024;

/// A relayed event and the connection it came from
#[derive(Debug, Clone)]
struct Relayed {
    origin: Uuid,
    event: InboundEvent,
}

#[derive(Clone)]
pub struct RelayState {
    markers: Arc<DashMap<String, Marker>>,
    hub: broadcast::Sender<Relayed>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            markers: Arc::new(DashMap::new()),
            hub,
        }
    }

    pub fn with_markers(snapshot: Snapshot) -> Self {
        let state = Self::new();
        for (id, marker) in snapshot {
            state.markers.insert(id, marker);
        }
        state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.markers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Fold a request into the relay's own copy and return what to broadcast
    fn absorb(&self, request: OutboundEvent) -> InboundEvent {
        match &request {
            OutboundEvent::CreateRequest(marker) => {
                self.markers.insert(marker.id.clone(), marker.clone());
            }
            OutboundEvent::DeleteRequest(id) => {
                self.markers.remove(id);
            }
            OutboundEvent::MoveRequest(marker) => {
                if let Some(mut entry) = self.markers.get_mut(&marker.id) {
                    entry.lat = marker.lat;
                    entry.lng = marker.lng;
                }
            }
        }
        request.into_broadcast()
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(|| async { "mapa relay" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/mapa", get(get_snapshot))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: RelayState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "relay listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_snapshot(State(state): State<RelayState>) -> Json<HashMap<String, Marker>> {
    Json(state.snapshot())
}

async fn ws_handler(
    State(state): State<RelayState>,
    ws: WebSocketUpgrade,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

async fn handle_ws(state: RelayState, socket: WebSocket) {
    let conn = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(%conn, "replica connected");

    // Everyone else's requests, re-emitted as inbound events
    let mut rx = state.hub.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            let relayed = match rx.recv().await {
                Ok(relayed) => relayed,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%conn, skipped, "slow replica, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if relayed.origin == conn {
                continue;
            }
            let text = match relayed.event.encode() {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%conn, error = %err, "encode failed");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let state_recv = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match OutboundEvent::decode(text.as_str()) {
                    Ok(request) => {
                        tracing::debug!(
                            %conn,
                            event = request.name(),
                            id = request.marker_id(),
                            "request"
                        );
                        let event = state_recv.absorb(request);
                        let _ = state_recv.hub.send(Relayed {
                            origin: conn,
                            event,
                        });
                    }
                    Err(err) => tracing::warn!(%conn, error = %err, "bad request frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    // Either side finishing ends the connection
    let send_abort = send_task.abort_handle();
    let recv_abort = recv_task.abort_handle();
    tokio::select! {
        _ = send_task => recv_abort.abort(),
        _ = recv_task => send_abort.abort(),
    }
    tracing::info!(%conn, "replica disconnected");
}
