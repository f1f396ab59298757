use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use tutor_types::events::RelayEvent;

/// Events buffered per subscriber before it starts lagging.
const BROADCAST_CAPACITY: usize = 1024;

/// One published event and the channel it belongs to.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: Arc<str>,
    pub event: RelayEvent,
}

/// In-process fan-out of channel events to every gateway session.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All sessions receive every event and filter by their own subscriptions
    broadcast_tx: broadcast::Sender<ChannelMessage>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to every channel. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Subscribe to a single channel.
    pub fn subscribe_channel(&self, channel: &str) -> ChannelSubscription {
        ChannelSubscription {
            channel: channel.to_string(),
            rx: self.subscribe(),
        }
    }

    /// Deliver an event to current subscribers. Never blocks; with no
    /// listeners the event is simply dropped.
    pub fn publish(&self, channel: &str, event: RelayEvent) {
        let _ = self.inner.broadcast_tx.send(ChannelMessage {
            channel: Arc::from(channel),
            event,
        });
    }

    pub fn receiver_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver filtered down to one channel.
pub struct ChannelSubscription {
    channel: String,
    rx: broadcast::Receiver<ChannelMessage>,
}

impl ChannelSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event on this channel, or `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if *msg.channel == *self.channel => return Some(msg.event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscription to {} lagged by {} events", self.channel, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
