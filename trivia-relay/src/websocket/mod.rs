use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use trivia_types::{ClientFrame, RelayFrame};
use warp::ws::{Message, WebSocket};

use crate::channels::ChannelRegistry;

pub mod connection;
pub mod handlers;
pub mod rate_limiter;

use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use rate_limiter::RateLimiter;

/// Per-connection rate limit settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub burst: u32,
    pub refill: Duration,
}

pub async fn handle_connection(
    websocket: WebSocket,
    connection_manager: Arc<ConnectionManager>,
    channels: Arc<ChannelRegistry>,
    rate_limit: RateLimit,
) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let message_receiver = connection_manager.create_connection(connection_id).await;
    let message_handler = MessageHandler::new(connection_id, connection_manager.clone(), channels);

    let incoming_handler = {
        let message_handler = message_handler.clone();
        let mut rate_limiter = RateLimiter::new_with_limits(rate_limit.burst, rate_limit.refill);

        async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(msg) if msg.is_close() => break,
                    Ok(msg) => {
                        if let Err(e) = handle_message(msg, &mut rate_limiter, &message_handler).await {
                            // Only a dead outbound queue ends the connection
                            error!("Error handling message for {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    };

    let outgoing_handler = async move {
        let mut receiver = message_receiver;

        while let Some(frame) = receiver.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize frame: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(json)).await {
                warn!("Failed to send frame to {}: {:?}", connection_id, e);
                break;
            }
        }
    };

    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    info!("Connection {} disconnected", connection_id);
    message_handler.handle_disconnect().await;
    connection_manager.remove_connection(connection_id).await;
}

/// Protocol problems are answered with an error frame and the socket stays
/// open. An `Err` means the connection can no longer be written to.
async fn handle_message(
    msg: Message,
    rate_limiter: &mut RateLimiter,
    message_handler: &MessageHandler,
) -> Result<(), String> {
    if !msg.is_text() {
        return Ok(());
    }

    let allowed = rate_limiter.check_rate_limit();
    let text = msg.to_str().unwrap_or_default();
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Invalid frame: {}", e);
            return message_handler
                .send_frame(RelayFrame::Error {
                    request_id: None,
                    message: format!("Invalid JSON message: {}", e),
                })
                .await;
        }
    };

    if !allowed {
        warn!("Rate limit exceeded for a relay connection");
        let request_id = match &frame {
            ClientFrame::Publish { request_id, .. } => Some(*request_id),
            _ => None,
        };
        return message_handler
            .send_frame(RelayFrame::Error {
                request_id,
                message: "Rate limit exceeded".to_string(),
            })
            .await;
    }

    message_handler.handle_message(frame).await
}
