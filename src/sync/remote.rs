use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::engine::ChannelSink;
use super::protocol::{InboundEvent, OutboundEvent};
use crate::error::{ChannelError, ProtocolError, RetryPolicy};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Handle to a background websocket connection.
///
/// Emits are queued to the connection task and written in order. Inbound
/// events arrive on the receiver returned by [`ChannelClient::connect`] in
/// the order the server sent them. Dropping the client shuts the task down.
pub struct ChannelClient {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl ChannelClient {
    /// Spawn the connection task. Connecting, and reconnecting after a drop,
    /// happen in the background with `retry` backoff.
    ///
    /// `wss://` urls connect over rustls with the webpki root store.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime, since the connection task
    /// is spawned onto it.
    pub fn connect(
        url: &str,
        retry: RetryPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundEvent>), ChannelError> {
        let url = Url::parse(url).map_err(|e| ChannelError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let task = tokio::spawn(run(url, retry, out_rx, in_tx, status_tx));

        Ok((
            Self {
                outbound: out_tx,
                status: status_rx,
                task,
            },
            in_rx,
        ))
    }

    pub fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        self.outbound.send(event).map_err(|_| ChannelError::Closed)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Read-only view of the connectivity flag
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

impl ChannelSink for ChannelClient {
    fn emit(&mut self, event: OutboundEvent) -> Result<(), ChannelError> {
        ChannelClient::emit(self, event)
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionEnd {
    Shutdown,
    Dropped,
}

async fn run(
    url: Url,
    retry: RetryPolicy,
    mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
    status: watch::Sender<ConnectionStatus>,
) {
    let mut attempts = 0u32;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempts = 0;
                status.send_replace(ConnectionStatus::Connected);
                tracing::info!(%url, "connected to server");

                let end = session(socket, &mut outbound, &inbound).await;
                status.send_replace(ConnectionStatus::Disconnected);
                match end {
                    SessionEnd::Shutdown => {
                        tracing::debug!(%url, "channel closed");
                        return;
                    }
                    SessionEnd::Dropped => tracing::warn!(%url, "disconnected from server"),
                }
            }
            Err(err) => tracing::warn!(%url, error = %err, "connect failed"),
        }

        attempts += 1;
        if !retry.allows(attempts) {
            tracing::error!(%url, attempts, "giving up on channel");
            return;
        }

        // Nothing is buffered for replay: emits while offline are lost
        let backoff = tokio::time::sleep(retry.delay_for(attempts));
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                _ = inbound.closed() => return,
                ev = outbound.recv() => match ev {
                    Some(ev) => tracing::warn!(
                        event = ev.name(),
                        id = ev.marker_id(),
                        "offline, dropping emit"
                    ),
                    None => return,
                },
            }
        }
    }
}

async fn session(
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    inbound: &mpsc::UnboundedSender<InboundEvent>,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = inbound.closed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            ev = outbound.recv() => {
                let Some(ev) = ev else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                match ev.encode() {
                    Ok(text) => {
                        tracing::debug!(event = ev.name(), id = ev.marker_id(), "emitting");
                        if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %err, "send failed");
                            return SessionEnd::Dropped;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "dropping unencodable event"),
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match InboundEvent::decode(text.as_str()) {
                    Ok(ev) => {
                        if inbound.send(ev).is_err() {
                            return SessionEnd::Shutdown;
                        }
                    }
                    Err(ProtocolError::UnknownEvent(name)) => {
                        tracing::debug!(event = %name, "ignoring unknown event");
                    }
                    Err(err) => tracing::warn!(error = %err, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "socket error");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}
