use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tutor_types::api::MessageView;

pub const DEFAULT_READ_DWELL: Duration = Duration::from_secs(1);

/// Decides when a visible message counts as read.
///
/// A message is due once it has stayed on screen for the dwell time. Hiding it
/// first cancels the timer. Every id is handed out by `due` at most once.
#[derive(Debug)]
pub struct ReadTracker {
    dwell: Duration,
    visible_since: HashMap<i64, Instant>,
    reported: HashSet<i64>,
}

impl Default for ReadTracker {
    fn default() -> Self {
        Self::new(DEFAULT_READ_DWELL)
    }
}

impl ReadTracker {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            visible_since: HashMap::new(),
            reported: HashSet::new(),
        }
    }

    /// The message with `id` came into view.
    pub fn shown(&mut self, id: i64, now: Instant) {
        if self.reported.contains(&id) {
            return;
        }
        self.visible_since.entry(id).or_insert(now);
    }

    /// Like `shown`, but ignores our own and already-read messages.
    pub fn shown_message(&mut self, message: &MessageView, self_id: i64, now: Instant) {
        if message.recipient_id != self_id {
            return;
        }
        if message.is_read {
            self.already_read(message.id);
            return;
        }
        self.shown(message.id, now);
    }

    pub fn hidden(&mut self, id: i64) {
        self.visible_since.remove(&id);
    }

    /// The server already has this id as read; never report it.
    pub fn already_read(&mut self, id: i64) {
        self.visible_since.remove(&id);
        self.reported.insert(id);
    }

    /// Drop everything known about `id`, e.g. once it scrolls out of the
    /// loaded history window.
    pub fn forget(&mut self, id: i64) {
        self.visible_since.remove(&id);
        self.reported.remove(&id);
    }

    /// Ids whose dwell elapsed, sorted. They will not be returned again.
    pub fn due(&mut self, now: Instant) -> Vec<i64> {
        let dwell = self.dwell;
        let mut ready: Vec<i64> = self
            .visible_since
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= dwell)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();

        for id in &ready {
            self.visible_since.remove(id);
            self.reported.insert(*id);
        }
        ready
    }

    /// When the next id becomes due, for scheduling a timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.visible_since.values().min().map(|since| *since + self.dwell)
    }
}
