use std::sync::Arc;
use tracing::{debug, info, warn};
use trivia_types::{ClientFrame, RelayFrame, TransportEvent};

use crate::channels::ChannelRegistry;
use crate::websocket::connection::{ConnectionId, ConnectionManager};

#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    channels: Arc<ChannelRegistry>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            channels,
        }
    }

    pub async fn handle_message(&self, frame: ClientFrame) -> Result<(), String> {
        self.connection_manager
            .update_activity(self.connection_id)
            .await;

        match frame {
            ClientFrame::Subscribe { channel } => self.handle_subscribe(channel).await,
            ClientFrame::Unsubscribe { channel } => self.handle_unsubscribe(channel).await,
            ClientFrame::Publish {
                channel,
                request_id,
                event,
            } => self.handle_publish(channel, request_id, event).await,
            ClientFrame::Heartbeat => {
                debug!("Heartbeat from {}", self.connection_id);
                Ok(())
            }
        }
    }

    pub async fn handle_disconnect(&self) {
        info!("Handling disconnect for connection {}", self.connection_id);
        self.channels.remove_connection(self.connection_id);
    }

    async fn handle_subscribe(&self, channel: String) -> Result<(), String> {
        self.channels.subscribe(&channel, self.connection_id);
        self.send_frame(RelayFrame::Subscribed { channel }).await
    }

    async fn handle_unsubscribe(&self, channel: String) -> Result<(), String> {
        self.channels.unsubscribe(&channel, self.connection_id);
        self.send_frame(RelayFrame::Unsubscribed { channel }).await
    }

    async fn handle_publish(
        &self,
        channel: String,
        request_id: u64,
        event: TransportEvent,
    ) -> Result<(), String> {
        if !self.channels.is_subscribed(&channel, self.connection_id) {
            warn!(
                "Connection {} published on {} without subscribing",
                self.connection_id, channel
            );
            return self
                .send_frame(RelayFrame::Error {
                    request_id: Some(request_id),
                    message: format!("Not subscribed to {}", channel),
                })
                .await;
        }

        let delivered = self
            .channels
            .publish(
                &self.connection_manager,
                &channel,
                Some(self.connection_id),
                event,
            )
            .await;
        self.send_frame(RelayFrame::Ack {
            request_id,
            delivered,
        })
        .await
    }

    pub async fn send_frame(&self, frame: RelayFrame) -> Result<(), String> {
        self.connection_manager
            .send_to_connection(self.connection_id, frame)
            .await
    }
}
