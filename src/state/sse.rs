use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Events buffered per subscriber before a slow client starts lagging.
pub const DEFAULT_SSE_CAPACITY: usize = 64;

/// Broadcast hub feeding the `/sse/queues` stream.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers; nobody listening is not an error.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Receivers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SseHub {
    fn default() -> Self {
        Self::new(DEFAULT_SSE_CAPACITY)
    }
}
