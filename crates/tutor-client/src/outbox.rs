use std::collections::HashSet;

use uuid::Uuid;

use tutor_types::api::MessageView;

/// Lifecycle of a locally-sent message.
#[derive(Debug, Clone, PartialEq)]
pub enum SendState {
    /// Rendered optimistically, request in flight
    Pending { temp_id: Uuid, content: String },

    /// The server persisted it
    Confirmed { message: MessageView },

    /// The request failed; `draft` goes back into the compose box
    Failed { temp_id: Uuid, draft: String },
}

impl SendState {
    pub fn temp_id(&self) -> Option<Uuid> {
        match self {
            Self::Pending { temp_id, .. } | Self::Failed { temp_id, .. } => Some(*temp_id),
            Self::Confirmed { .. } => None,
        }
    }
}

/// Ordered list of the messages this client sent, in send order.
#[derive(Debug, Default)]
pub struct Outbox {
    entries: Vec<(Uuid, SendState)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send that is about to go out and return its temporary id.
    pub fn begin(&mut self, content: impl Into<String>) -> Uuid {
        let temp_id = Uuid::new_v4();
        self.entries.push((
            temp_id,
            SendState::Pending {
                temp_id,
                content: content.into(),
            },
        ));
        temp_id
    }

    /// Swap a pending entry for the server's copy. Returns false if the id is unknown.
    pub fn confirm(&mut self, temp_id: Uuid, message: MessageView) -> bool {
        let Some(state) = self.find_mut(temp_id) else {
            return false;
        };
        if !matches!(state, SendState::Pending { .. }) {
            return false;
        }
        *state = SendState::Confirmed { message };
        true
    }

    /// Mark a pending entry failed and hand back its text.
    pub fn fail(&mut self, temp_id: Uuid) -> Option<String> {
        let state = self.find_mut(temp_id)?;
        let SendState::Pending { content, .. } = state else {
            return None;
        };
        let draft = std::mem::take(content);
        *state = SendState::Failed {
            temp_id,
            draft: draft.clone(),
        };
        Some(draft)
    }

    /// Put a failed entry back to pending for another attempt.
    pub fn retry(&mut self, temp_id: Uuid) -> Option<String> {
        let state = self.find_mut(temp_id)?;
        let SendState::Failed { draft, .. } = state else {
            return None;
        };
        let content = std::mem::take(draft);
        *state = SendState::Pending {
            temp_id,
            content: content.clone(),
        };
        Some(content)
    }

    /// Drop a failed entry the user gave up on.
    pub fn discard(&mut self, temp_id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(id, state)| !(*id == temp_id && matches!(state, SendState::Failed { .. })));
        self.entries.len() != before
    }

    /// Drop confirmed entries whose server copy now shows up in fetched
    /// history. Returns how many were dropped.
    pub fn settle(&mut self, history_ids: impl IntoIterator<Item = i64>) -> usize {
        let seen: HashSet<i64> = history_ids.into_iter().collect();
        let before = self.entries.len();
        self.entries.retain(|(_, state)| {
            !matches!(state, SendState::Confirmed { message } if seen.contains(&message.id))
        });
        before - self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &SendState> {
        self.entries.iter().map(|(_, state)| state)
    }

    pub fn pending_count(&self) -> usize {
        self.entries()
            .filter(|s| matches!(s, SendState::Pending { .. }))
            .count()
    }

    /// Whether a live `new-message` echo is one of ours that is already shown.
    pub fn is_known(&self, server_id: i64) -> bool {
        self.entries()
            .any(|s| matches!(s, SendState::Confirmed { message } if message.id == server_id))
    }

    fn find_mut(&mut self, temp_id: Uuid) -> Option<&mut SendState> {
        self.entries
            .iter_mut()
            .find(|(id, _)| *id == temp_id)
            .map(|(_, state)| state)
    }
}
