/// Database row types — these map directly to SQLite rows.
/// Roles and timestamps stay as stored text; tutor-api parses them.

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub role: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: i64,
    pub sender_role: String,
    pub sender_name: String,
    pub recipient_id: i64,
    pub recipient_role: String,
    pub content: String,
    pub created_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
}

/// A message whose read flag was flipped by `mark_read`.
pub struct ReadRow {
    pub id: i64,
    pub conversation_id: String,
}

/// One entry of a user's conversation list, with the newest message inlined.
pub struct ConversationRow {
    pub conversation_id: String,
    pub peer_id: i64,
    pub peer_name: String,
    pub peer_role: String,
    pub unread_count: i64,
    pub last_message: MessageRow,
}
