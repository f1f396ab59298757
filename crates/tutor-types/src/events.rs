use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::MessageView;
use crate::models::Role;

/// Events published on a conversation channel.
///
/// The tag doubles as the hosted relay event name, so it must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// A message was persisted on this conversation
    NewMessage(MessageView),

    /// The recipient read some messages
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        message_ids: Vec<i64>,
        reader_id: i64,
        read_at: DateTime<Utc>,
    },

    /// The peer is typing
    #[serde(rename = "client-typing", rename_all = "camelCase")]
    Typing { user_id: i64, role: Role },
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new-message",
            Self::MessagesRead { .. } => "messages-read",
            Self::Typing { .. } => "client-typing",
        }
    }

    /// The event payload alone, as the hosted relay expects it.
    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Frames sent FROM server TO client over the gateway WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayFrame {
    /// Server confirms successful authentication
    Ready { user_id: i64, role: Role },

    /// A `Subscribe` was accepted
    Subscribed { channel: String },

    /// A `Subscribe` was refused
    SubscriptionError { channel: String, reason: String },

    /// An event on a subscribed channel
    Event { channel: String, payload: RelayEvent },
}

/// Commands sent FROM client TO server over the gateway WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events for a conversation channel
    Subscribe { channel: String },

    /// Stop receiving events for a conversation channel
    Unsubscribe { channel: String },

    /// Indicate typing on a subscribed channel
    StartTyping { channel: String },
}
