use std::collections::HashMap;
use std::time::{Duration, Instant};

use tutor_types::events::RelayEvent;

pub const DEFAULT_SEND_THROTTLE: Duration = Duration::from_secs(3);
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_secs(5);

/// Typing state for one conversation view.
#[derive(Debug)]
pub struct TypingIndicator {
    throttle: Duration,
    expiry: Duration,
    last_sent: Option<Instant>,
    peers: HashMap<i64, Instant>,
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_THROTTLE, DEFAULT_TYPING_EXPIRY)
    }
}

impl TypingIndicator {
    pub fn new(throttle: Duration, expiry: Duration) -> Self {
        Self {
            throttle,
            expiry,
            last_sent: None,
            peers: HashMap::new(),
        }
    }

    /// Call on each keystroke; true when a `StartTyping` should go out now.
    pub fn should_send(&mut self, now: Instant) -> bool {
        let due = self
            .last_sent
            .is_none_or(|at| now.saturating_duration_since(at) >= self.throttle);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    pub fn on_event(&mut self, event: &RelayEvent, self_id: i64, now: Instant) {
        match event {
            RelayEvent::Typing { user_id, .. } if *user_id != self_id => {
                self.peers.insert(*user_id, now);
            }
            // A delivered message ends that sender's typing
            RelayEvent::NewMessage(message) => {
                self.peers.remove(&message.sender_id);
            }
            _ => {}
        }
    }

    /// Peers who typed within the expiry window, sorted.
    pub fn typing_peers(&mut self, now: Instant) -> Vec<i64> {
        let expiry = self.expiry;
        self.peers
            .retain(|_, at| now.saturating_duration_since(*at) < expiry);
        let mut peers: Vec<i64> = self.peers.keys().copied().collect();
        peers.sort_unstable();
        peers
    }
}
