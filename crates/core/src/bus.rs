use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::message::{Context, Message};

/// Typed message bus between the page, coordinator and panel contexts.
///
/// One broadcast channel per destination context. Delivery is FIFO per
/// channel and best effort: a message published while its destination has no
/// subscriber is dropped, never queued.
#[derive(Clone)]
pub struct MessageBus {
    channels: HashMap<Context, broadcast::Sender<Message>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let channels = Context::ALL
            .iter()
            .map(|ctx| {
                let (tx, _) = broadcast::channel(capacity.max(16));
                (*ctx, tx)
            })
            .collect();
        Self { channels }
    }

    /// Route `message` to its destination context.
    /// Returns the number of subscribers that received it (0 = dropped).
    pub fn publish(&self, message: Message) -> usize {
        let destination = message.destination();
        let kind = message.kind();
        match self.channel(destination).send(message) {
            Ok(delivered) => delivered,
            Err(_) => {
                debug!(?kind, %destination, "no listener loaded, message dropped");
                0
            }
        }
    }

    /// Receive every message addressed to `context`.
    pub fn subscribe(&self, context: Context) -> broadcast::Receiver<Message> {
        self.channel(context).subscribe()
    }

    pub fn receiver_count(&self, context: Context) -> usize {
        self.channel(context).receiver_count()
    }

    fn channel(&self, context: Context) -> &broadcast::Sender<Message> {
        // Every context gets a channel in `new`.
        &self.channels[&context]
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(64)
    }
}
