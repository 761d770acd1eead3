use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use trivia_types::{ClientFrame, RelayFrame, TransportEvent};

use super::{SendReceipt, Subscription, Transport};
use crate::error::TransportError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type Routes = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<TransportEvent>>>>;
type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<usize, String>>>>>;

/// Websocket client for the relay. One socket carries every channel; a
/// background task pumps frames in both directions.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    routes: Routes,
    pending: PendingAcks,
    next_request_id: AtomicU64,
    ack_timeout: Duration,
    pump: JoinHandle<()>,
}

impl WsTransport {
    pub async fn connect(url: &str, ack_timeout: Duration) -> Result<Self, TransportError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to relay at {}", url);

        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let routes: Routes = Arc::default();
        let pending: PendingAcks = Arc::default();

        let pump = tokio::spawn({
            let routes = routes.clone();
            let pending = pending.clone();
            async move {
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
                loop {
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else { break };
                            let json = match serde_json::to_string(&frame) {
                                Ok(json) => json,
                                Err(e) => {
                                    warn!("Failed to serialize frame: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = ws_sender.send(Message::Text(json)).await {
                                warn!("Failed to send frame to relay: {}", e);
                                break;
                            }
                        }
                        incoming = ws_receiver.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<RelayFrame>(&text) {
                                        Ok(frame) => route_frame(frame, &routes, &pending).await,
                                        Err(e) => warn!("Dropping malformed relay frame: {}", e),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("Relay socket error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = heartbeat.tick() => {
                            let json = serde_json::to_string(&ClientFrame::Heartbeat).unwrap_or_default();
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                info!("Relay connection closed");
                // Dropping the senders fails every in-flight send with Closed
                pending.lock().await.clear();
                routes.write().await.clear();
            }
        });

        Ok(Self {
            outbound,
            routes,
            pending,
            next_request_id: AtomicU64::new(1),
            ack_timeout,
            pump,
        })
    }

    fn push(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn route_frame(frame: RelayFrame, routes: &Routes, pending: &PendingAcks) {
    match frame {
        RelayFrame::Event { channel, event } => {
            let routes = routes.read().await;
            match routes.get(&channel) {
                Some(subscriber) => {
                    let _ = subscriber.send(event);
                }
                None => debug!("Event for unsubscribed channel {}", channel),
            }
        }
        RelayFrame::Ack {
            request_id,
            delivered,
        } => {
            if let Some(waiter) = pending.lock().await.remove(&request_id) {
                let _ = waiter.send(Ok(delivered));
            }
        }
        RelayFrame::Error {
            request_id: Some(request_id),
            message,
        } => {
            if let Some(waiter) = pending.lock().await.remove(&request_id) {
                let _ = waiter.send(Err(message));
            }
        }
        RelayFrame::Error {
            request_id: None,
            message,
        } => warn!("Relay error: {}", message),
        RelayFrame::Subscribed { channel } => debug!("Subscribed to {}", channel),
        RelayFrame::Unsubscribed { channel } => debug!("Unsubscribed from {}", channel),
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let (sender, events) = mpsc::unbounded_channel();
        self.routes
            .write()
            .await
            .insert(channel.to_string(), sender);
        self.push(ClientFrame::Subscribe {
            channel: channel.to_string(),
        })?;

        Ok(Subscription {
            channel: channel.to_string(),
            events,
        })
    }

    async fn send(
        &self,
        channel: &str,
        event: TransportEvent,
    ) -> Result<SendReceipt, TransportError> {
        if !self.routes.read().await.contains_key(channel) {
            return Err(TransportError::NotSubscribed(channel.to_string()));
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (waiter, ack) = oneshot::channel();
        self.pending.lock().await.insert(request_id, waiter);
        let published = self.push(ClientFrame::Publish {
            channel: channel.to_string(),
            request_id,
            event,
        });
        if let Err(e) = published {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(Ok(delivered))) => Ok(SendReceipt { delivered }),
            Ok(Ok(Err(message))) => Err(TransportError::Rejected(message)),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(TransportError::AckTimeout { request_id })
            }
        }
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.routes.write().await.remove(channel);
        self.push(ClientFrame::Unsubscribe {
            channel: channel.to_string(),
        })
    }
}
