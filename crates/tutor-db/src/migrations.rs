use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('student', 'parent', 'teacher')),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            sender_role     TEXT NOT NULL,
            recipient_id    INTEGER NOT NULL REFERENCES users(id),
            recipient_role  TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            read_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, id);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
