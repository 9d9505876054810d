use {
    async_trait::async_trait,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    store::Store,
    types::{ContactRecord, NewContact, NewMessage, NewSessionRecord, SessionRecord, StoredMessage},
};

type MessageRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    String,
    i64,
);

const SELECT_MESSAGE: &str = "SELECT id, message_id, sender_party, recipient_party, content,
        kind, timestamp, session_key, phone_number, account_jid, user_id
 FROM messages";

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect a pool and create the schema if missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    /// Create a store from an existing pool (schema must already exist).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent schema creation.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id      TEXT    NOT NULL,
                sender_party    TEXT    NOT NULL,
                recipient_party TEXT    NOT NULL,
                content         TEXT    NOT NULL,
                kind            TEXT    NOT NULL,
                timestamp       INTEGER NOT NULL,
                session_key     TEXT    NOT NULL,
                phone_number    TEXT    NOT NULL,
                account_jid     TEXT    NOT NULL,
                user_id         INTEGER NOT NULL,
                UNIQUE (message_id, session_key)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_user_timestamp
             ON messages (user_id, timestamp DESC)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_party TEXT    NOT NULL,
                user_id       INTEGER NOT NULL,
                phone_number  TEXT    NOT NULL,
                jid           TEXT    NOT NULL,
                alias         TEXT,
                last_seen     INTEGER NOT NULL,
                UNIQUE (contact_party, user_id, phone_number)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL,
                phone_number TEXT    NOT NULL,
                session_key  TEXT    NOT NULL,
                UNIQUE (user_id, phone_number)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn message_from_row(r: MessageRow) -> StoredMessage {
    StoredMessage {
        id: r.0,
        message_id: r.1,
        sender_party: r.2,
        recipient_party: r.3,
        content: r.4,
        kind: r.5,
        timestamp: r.6,
        session_key: r.7,
        phone_number: r.8,
        account_jid: r.9,
        user_id: r.10,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn message_exists(&self, message_id: &str, session_key: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM messages WHERE message_id = ? AND session_key = ?",
        )
        .bind(message_id)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO messages
             (message_id, sender_party, recipient_party, content, kind,
              timestamp, session_key, phone_number, account_jid, user_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.message_id)
        .bind(&message.sender_party)
        .bind(&message.recipient_party)
        .bind(&message.content)
        .bind(&message.kind)
        .bind(message.timestamp)
        .bind(&message.session_key)
        .bind(&message.phone_number)
        .bind(&message.account_jid)
        .bind(message.user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn message_by_id(&self, id: i64, user_id: i64) -> Result<Option<StoredMessage>> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("{SELECT_MESSAGE} WHERE id = ? AND user_id = ?"))
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(message_from_row))
    }

    async fn conversation(
        &self,
        user_id: i64,
        contact_party: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "{SELECT_MESSAGE}
             WHERE user_id = ? AND (
               (recipient_party = ? AND sender_party = 'me') OR
               (sender_party = ? AND recipient_party = 'me')
             )
             ORDER BY timestamp DESC
             LIMIT ?"
        ))
        .bind(user_id)
        .bind(contact_party)
        .bind(contact_party)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn upsert_contact(&self, contact: &NewContact) -> Result<Option<i64>> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM contacts
             WHERE contact_party = ? AND user_id = ? AND phone_number = ?",
        )
        .bind(&contact.contact_party)
        .bind(contact.user_id)
        .bind(&contact.phone_number)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE contacts SET last_seen = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO contacts (contact_party, user_id, phone_number, jid, last_seen)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&contact.contact_party)
        .bind(contact.user_id)
        .bind(&contact.phone_number)
        .bind(&contact.jid)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(Some(result.last_insert_rowid()))
    }

    async fn contacts_by_user(&self, user_id: i64) -> Result<Vec<ContactRecord>> {
        let rows: Vec<(i64, String, i64, String, String, Option<String>, i64)> = sqlx::query_as(
            "SELECT id, contact_party, user_id, phone_number, jid, alias, last_seen
             FROM contacts
             WHERE user_id = ?
             ORDER BY last_seen DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ContactRecord {
                id: r.0,
                contact_party: r.1,
                user_id: r.2,
                phone_number: r.3,
                jid: r.4,
                alias: r.5,
                last_seen: r.6,
            })
            .collect())
    }

    async fn update_contact_alias(&self, id: i64, user_id: i64, alias: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE contacts SET alias = ? WHERE id = ? AND user_id = ?")
            .bind(alias)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_session(&self, session: &NewSessionRecord) -> Result<Option<i64>> {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM sessions WHERE user_id = ? AND phone_number = ?",
        )
        .bind(session.user_id)
        .bind(&session.phone_number)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO sessions (user_id, phone_number, session_key) VALUES (?, ?, ?)",
        )
        .bind(session.user_id)
        .bind(&session.phone_number)
        .bind(&session.session_key)
        .execute(&self.pool)
        .await?;
        Ok(Some(result.last_insert_rowid()))
    }

    async fn sessions_by_user(&self, user_id: i64) -> Result<Vec<SessionRecord>> {
        let rows: Vec<(i64, i64, String, String)> = sqlx::query_as(
            "SELECT id, user_id, phone_number, session_key FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SessionRecord {
                id: r.0,
                user_id: r.1,
                phone_number: r.2,
                session_key: r.3,
            })
            .collect())
    }
}
