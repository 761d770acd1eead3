use async_trait::async_trait;
use tokio::sync::mpsc;
use trivia_types::TransportEvent;

use crate::error::TransportError;

pub mod memory;
pub mod ws;

pub use memory::{MemoryHub, MemoryTransport};
pub use ws::WsTransport;

/// Inbound events for one subscribed channel
pub struct Subscription {
    pub channel: String,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Acknowledgement for a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub delivered: usize,
}

/// Named-channel pub/sub. Delivery is best effort: events may be duplicated,
/// and whether the sender hears its own events depends on the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;

    async fn send(
        &self,
        channel: &str,
        event: TransportEvent,
    ) -> Result<SendReceipt, TransportError>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;
}
