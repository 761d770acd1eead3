use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use trivia_types::TransportEvent;
use uuid::Uuid;

use super::{SendReceipt, Subscription, Transport};
use crate::error::TransportError;

type DropFilter = Arc<dyn Fn(&TransportEvent) -> bool + Send + Sync>;

#[derive(Default)]
struct HubState {
    channels: HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<TransportEvent>)>>,
    echo_to_sender: bool,
    duplicate_delivery: bool,
    drop_filter: Option<DropFilter>,
}

/// In-process broadcast hub. Every `MemoryTransport` connected to the same hub
/// sees the same channels.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<RwLock<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            id: Uuid::new_v4(),
        }
    }

    pub async fn set_echo_to_sender(&self, echo: bool) {
        self.state.write().await.echo_to_sender = echo;
    }

    /// Deliver every event twice
    pub async fn set_duplicate_delivery(&self, duplicate: bool) {
        self.state.write().await.duplicate_delivery = duplicate;
    }

    /// Events matching `filter` are silently lost
    pub async fn set_drop_filter(
        &self,
        filter: impl Fn(&TransportEvent) -> bool + Send + Sync + 'static,
    ) {
        self.state.write().await.drop_filter = Some(Arc::new(filter));
    }

    /// Publishes on behalf of no subscriber, the way a server-side
    /// notification would arrive.
    pub async fn publish(&self, channel: &str, event: TransportEvent) -> usize {
        self.fan_out(None, channel, event).await
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .read()
            .await
            .channels
            .get(channel)
            .map_or(0, |subscribers| subscribers.len())
    }

    async fn fan_out(&self, sender: Option<Uuid>, channel: &str, event: TransportEvent) -> usize {
        let state = self.state.read().await;
        if state.drop_filter.as_ref().is_some_and(|drop| drop(&event)) {
            debug!("Dropping '{}' event on {}", event.event, channel);
            return 0;
        }
        let Some(subscribers) = state.channels.get(channel) else {
            return 0;
        };

        let copies = if state.duplicate_delivery { 2 } else { 1 };
        let mut delivered = 0;
        for (id, subscriber) in subscribers {
            if Some(*id) == sender && !state.echo_to_sender {
                continue;
            }
            let mut ok = true;
            for _ in 0..copies {
                ok &= subscriber.send(event.clone()).is_ok();
            }
            if ok {
                delivered += 1;
            }
        }
        delivered
    }
}

pub struct MemoryTransport {
    hub: MemoryHub,
    id: Uuid,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let (sender, events) = mpsc::unbounded_channel();
        let mut state = self.hub.state.write().await;
        let subscribers = state.channels.entry(channel.to_string()).or_default();
        subscribers.retain(|(id, _)| *id != self.id);
        subscribers.push((self.id, sender));

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
        let subscribed = self
            .hub
            .state
            .read()
            .await
            .channels
            .get(channel)
            .is_some_and(|subscribers| subscribers.iter().any(|(id, _)| *id == self.id));
        if !subscribed {
            return Err(TransportError::NotSubscribed(channel.to_string()));
        }

        let delivered = self.hub.fan_out(Some(self.id), channel, event).await;
        Ok(SendReceipt { delivered })
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.hub.state.write().await;
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                state.channels.remove(channel);
            }
        }
        Ok(())
    }
}
