use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, info};
use trivia_types::{RelayFrame, TransportEvent};

use crate::websocket::connection::{ConnectionId, ConnectionManager};

/// Named broadcast channels and who listens on each
pub struct ChannelRegistry {
    subscribers: DashMap<String, HashSet<ConnectionId>>,
    echo_to_sender: bool,
}

impl ChannelRegistry {
    pub fn new(echo_to_sender: bool) -> Self {
        Self {
            subscribers: DashMap::new(),
            echo_to_sender,
        }
    }

    pub fn subscribe(&self, channel: &str, connection: ConnectionId) {
        let added = self
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .insert(connection);
        if added {
            info!("Connection {} subscribed to {}", connection, channel);
        }
    }

    pub fn unsubscribe(&self, channel: &str, connection: ConnectionId) {
        if let Some(mut members) = self.subscribers.get_mut(channel) {
            members.remove(&connection);
        }
        self.subscribers.remove_if(channel, |_, members| members.is_empty());
        info!("Connection {} unsubscribed from {}", connection, channel);
    }

    /// Forgets `connection` on every channel
    pub fn remove_connection(&self, connection: ConnectionId) {
        for mut members in self.subscribers.iter_mut() {
            members.remove(&connection);
        }
        self.subscribers.retain(|_, members| !members.is_empty());
    }

    pub fn is_subscribed(&self, channel: &str, connection: ConnectionId) -> bool {
        self.subscribers
            .get(channel)
            .is_some_and(|members| members.contains(&connection))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.get(channel).map_or(0, |members| members.len())
    }

    pub fn channel_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fans `event` out to the channel's subscribers. The sender, if any, is
    /// skipped unless echo is enabled. Returns the number of deliveries.
    pub async fn publish(
        &self,
        connections: &ConnectionManager,
        channel: &str,
        sender: Option<ConnectionId>,
        event: TransportEvent,
    ) -> usize {
        // Collect first so no map guard is held across the await
        let targets: Vec<ConnectionId> = self
            .subscribers
            .get(channel)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|id| self.echo_to_sender || Some(*id) != sender)
                    .collect()
            })
            .unwrap_or_default();

        let kind = event.event.clone();
        let frame = RelayFrame::Event {
            channel: channel.to_string(),
            event,
        };
        let delivered = connections.send_to_many(&targets, &frame).await;
        debug!("Published '{}' on {} to {} subscribers", kind, channel, delivered);
        delivered
    }
}
