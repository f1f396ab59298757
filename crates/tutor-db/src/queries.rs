use crate::models::{ConversationRow, MessageRow, ReadRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

/// Columns selected for a message, joined with its sender's name.
/// `m` is the messages alias, `s` the sender's users alias.
const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, m.sender_role, \
     COALESCE(s.name, 'unknown'), m.recipient_id, m.recipient_role, m.content, \
     m.created_at, m.is_read, m.read_at";

/// Fields of a message about to be inserted.
pub struct NewMessage<'a> {
    pub conversation_id: &'a str,
    pub sender_id: i64,
    pub sender_role: &'a str,
    pub recipient_id: i64,
    pub recipient_role: &'a str,
    pub content: &'a str,
}

/// Outcome of a `mark_read` call.
pub struct ReadReceipt {
    pub read_at: String,
    pub rows: Vec<ReadRow>,
}

impl Database {
    // -- Users --

    /// Insert or rename a user. Accounts are owned by the wider platform;
    /// this exists for provisioning tools and tests.
    pub fn upsert_user(&self, id: i64, name: &str, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
                rusqlite::params![id, name, role],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    // -- Messages --

    /// Insert a message and return the stored row.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        let created_at = now_timestamp();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (conversation_id, sender_id, sender_role, recipient_id, recipient_role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.conversation_id,
                    msg.sender_id,
                    msg.sender_role,
                    msg.recipient_id,
                    msg.recipient_role,
                    msg.content,
                    created_at,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Inserted message {} vanished", id))
        })
    }

    /// Messages of one conversation, oldest first.
    ///
    /// Returns the newest `limit` messages older than `before` (a message id),
    /// so callers page backwards through history.
    pub fn get_conversation(
        &self,
        conversation_id: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 LEFT JOIN users s ON s.id = m.sender_id
                 WHERE m.conversation_id = ?1
                   AND (?2 IS NULL OR m.id < ?2)
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, before, limit], |row| {
                    message_from_row(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    /// Flip unread messages addressed to `recipient_id` to read.
    ///
    /// Ids that are unknown, already read, or addressed to someone else are
    /// skipped, so repeating a call updates nothing.
    pub fn mark_read(&self, message_ids: &[i64], recipient_id: i64) -> Result<ReadReceipt> {
        let read_at = now_timestamp();
        if message_ids.is_empty() {
            return Ok(ReadReceipt { read_at, rows: vec![] });
        }

        let placeholders: Vec<String> = (3..3 + message_ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "UPDATE messages SET is_read = 1, read_at = ?1
             WHERE recipient_id = ?2 AND is_read = 0 AND id IN ({})
             RETURNING id, conversation_id",
            placeholders.join(", ")
        );

        let mut params = Vec::with_capacity(message_ids.len() + 2);
        params.push(Value::Text(read_at.clone()));
        params.push(Value::Integer(recipient_id));
        params.extend(message_ids.iter().map(|id| Value::Integer(*id)));

        let rows = self.with_conn_mut(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(ReadRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(ReadReceipt { read_at, rows })
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Every conversation `user_id` takes part in, most recent activity first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.unread,
                        CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END,
                        CASE WHEN m.sender_id = ?1 THEN m.recipient_role ELSE m.sender_role END,
                        COALESCE(p.name, 'unknown'),
                        {MESSAGE_COLUMNS}
                 FROM (
                     SELECT conversation_id,
                            MAX(id) AS last_id,
                            SUM(CASE WHEN recipient_id = ?1 AND is_read = 0 THEN 1 ELSE 0 END) AS unread
                     FROM messages
                     WHERE sender_id = ?1 OR recipient_id = ?1
                     GROUP BY conversation_id
                 ) c
                 JOIN messages m ON m.id = c.last_id
                 LEFT JOIN users s ON s.id = m.sender_id
                 LEFT JOIN users p ON p.id = CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END
                 ORDER BY m.created_at DESC, m.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let last_message = message_from_row(row, 4)?;
                    Ok(ConversationRow {
                        conversation_id: last_message.conversation_id.clone(),
                        unread_count: row.get(0)?,
                        peer_id: row.get(1)?,
                        peer_role: row.get(2)?,
                        peer_name: row.get(3)?,
                        last_message,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// UTC timestamp with millisecond precision; sorts lexicographically.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, name, role FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         LEFT JOIN users s ON s.id = m.sender_id
         WHERE m.id = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], |row| message_from_row(row, 0)).optional()?;
    Ok(row)
}

/// Read `MESSAGE_COLUMNS` starting at column `offset`.
fn message_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(offset)?,
        conversation_id: row.get(offset + 1)?,
        sender_id: row.get(offset + 2)?,
        sender_role: row.get(offset + 3)?,
        sender_name: row.get(offset + 4)?,
        recipient_id: row.get(offset + 5)?,
        recipient_role: row.get(offset + 6)?,
        content: row.get(offset + 7)?,
        created_at: row.get(offset + 8)?,
        is_read: row.get(offset + 9)?,
        read_at: row.get(offset + 10)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
