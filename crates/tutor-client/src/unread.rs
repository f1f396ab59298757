use std::time::{Duration, Instant};

use tutor_types::events::RelayEvent;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Unread badge kept current from live events and corrected from the server.
#[derive(Debug)]
pub struct UnreadCounter {
    count: i64,
    interval: Duration,
    last_reconciled: Option<Instant>,
}

impl Default for UnreadCounter {
    fn default() -> Self {
        Self::new(DEFAULT_RECONCILE_INTERVAL)
    }
}

impl UnreadCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            count: 0,
            interval,
            last_reconciled: None,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Count a live message addressed to us. Other events are ignored; our
    /// own reads are applied through `marked_read` with the server's count.
    pub fn on_event(&mut self, event: &RelayEvent, self_id: i64) {
        if let RelayEvent::NewMessage(message) = event {
            if message.recipient_id == self_id && !message.is_read {
                self.count += 1;
            }
        }
    }

    /// Apply the `updatedCount` of a successful mark-read.
    pub fn marked_read(&mut self, updated: usize) {
        let updated = i64::try_from(updated).unwrap_or(i64::MAX);
        self.count = self.count.saturating_sub(updated).max(0);
    }

    /// Replace the optimistic value with the server's.
    pub fn reconcile(&mut self, server_count: i64, now: Instant) {
        self.count = server_count.max(0);
        self.last_reconciled = Some(now);
    }

    pub fn needs_reconcile(&self, now: Instant) -> bool {
        match self.last_reconciled {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.interval,
        }
    }
}
