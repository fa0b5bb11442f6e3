use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

/// Lifecycle of a local conversation.
///
/// Stored as text in SQLite; rows written by older builds (or edited by hand)
/// may carry values outside this set, which is why [`Conversation::status`]
/// parses lazily instead of failing the whole row read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    AwaitingMenuResponse,
    WithAgent,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::AwaitingMenuResponse => "awaiting_menu_response",
            ConversationStatus::WithAgent => "with_agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_menu_response" => Some(ConversationStatus::AwaitingMenuResponse),
            "with_agent" => Some(ConversationStatus::WithAgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// One conversation per distinct WhatsApp number.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub from_number: String,
    /// Raw status column; use [`Conversation::status`] for the parsed form.
    pub status_raw: String,
    pub chatwoot_contact_id: Option<i64>,
    pub chatwoot_conversation_id: Option<i64>,
}

impl Conversation {
    /// Parsed status; `None` for unrecognized stored values, which the engine
    /// treats as a recoverable condition rather than a fatal one.
    pub fn status(&self) -> Option<ConversationStatus> {
        ConversationStatus::parse(&self.status_raw)
    }
}

/// Append-only log entry owned by exactly one conversation.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub body: String,
    pub direction: String,
    pub twilio_sid: Option<String>,
    pub created_at: String,
}

pub struct ConversationStore {
    conn: std::sync::Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: std::sync::Mutex::new(conn),
        };
        store.ensure_schema().with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY,
                from_number TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                chatwoot_contact_id INTEGER,
                chatwoot_conversation_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id),
                body TEXT NOT NULL,
                direction TEXT NOT NULL,
                twilio_sid TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
             CREATE INDEX IF NOT EXISTS idx_conversations_remote
                 ON conversations(chatwoot_conversation_id);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    /// Find the conversation for `from_number`, creating it when unseen.
    ///
    /// Returns the row plus whether this call created it. Concurrent first
    /// messages from the same number race here; `INSERT .. ON CONFLICT DO
    /// NOTHING` followed by a read makes the loser a benign no-op backed by
    /// the UNIQUE constraint.
    pub fn find_or_create(&self, from_number: &str) -> Result<(Conversation, bool)> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT INTO conversations (from_number, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(from_number) DO NOTHING",
            params![
                from_number,
                ConversationStatus::AwaitingMenuResponse.as_str(),
                now
            ],
        )?;
        let created = inserted > 0;
        if created {
            debug!("created conversation for {}", from_number);
        }

        let conversation = conn
            .query_row(
                "SELECT id, from_number, status, chatwoot_contact_id, chatwoot_conversation_id
                 FROM conversations WHERE from_number = ?1",
                params![from_number],
                row_to_conversation,
            )
            .with_context(|| format!("Conversation vanished after upsert: {}", from_number))?;
        Ok((conversation, created))
    }

    pub fn find_by_number(&self, from_number: &str) -> Result<Option<Conversation>> {
        let conn = self.lock()?;
        let conversation = conn
            .query_row(
                "SELECT id, from_number, status, chatwoot_contact_id, chatwoot_conversation_id
                 FROM conversations WHERE from_number = ?1",
                params![from_number],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn find_by_remote_conversation(&self, remote_id: i64) -> Result<Option<Conversation>> {
        let conn = self.lock()?;
        let conversation = conn
            .query_row(
                "SELECT id, from_number, status, chatwoot_contact_id, chatwoot_conversation_id
                 FROM conversations WHERE chatwoot_conversation_id = ?1",
                params![remote_id],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn set_status(&self, conversation_id: i64, status: ConversationStatus) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), conversation_id],
        )?;
        anyhow::ensure!(updated == 1, "no conversation with id {}", conversation_id);
        Ok(())
    }

    /// Persist the outcome of a successful handoff in one write: both remote
    /// ids and the status flip land together, so a crash can never leave a
    /// half-transferred row.
    pub fn record_handoff(
        &self,
        conversation_id: i64,
        chatwoot_contact_id: i64,
        chatwoot_conversation_id: i64,
    ) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE conversations
             SET status = ?1, chatwoot_contact_id = ?2, chatwoot_conversation_id = ?3,
                 updated_at = ?4
             WHERE id = ?5",
            params![
                ConversationStatus::WithAgent.as_str(),
                chatwoot_contact_id,
                chatwoot_conversation_id,
                Utc::now().to_rfc3339(),
                conversation_id
            ],
        )?;
        anyhow::ensure!(updated == 1, "no conversation with id {}", conversation_id);
        Ok(())
    }

    pub fn append_message(
        &self,
        conversation_id: i64,
        body: &str,
        direction: Direction,
        twilio_sid: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (conversation_id, body, direction, twilio_sid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation_id,
                body,
                direction.as_str(),
                twilio_sid,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn messages(&self, conversation_id: i64) -> Result<Vec<MessageRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, body, direction, twilio_sid, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                Ok(MessageRecord {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    body: row.get(2)?,
                    direction: row.get(3)?,
                    twilio_sid: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn conversation_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?)
    }

    pub fn message_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        from_number: row.get(1)?,
        status_raw: row.get(2)?,
        chatwoot_contact_id: row.get(3)?,
        chatwoot_conversation_id: row.get(4)?,
    })
}
