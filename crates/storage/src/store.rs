use async_trait::async_trait;

use crate::{
    Result,
    types::{ContactRecord, NewContact, NewMessage, NewSessionRecord, SessionRecord, StoredMessage},
};

/// Persistence contract consumed by the ingestion pipeline, the supervisor
/// and the REST surface. Tests substitute in-memory SQLite.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a row with this (message_id, session_key) pair exists.
    async fn message_exists(&self, message_id: &str, session_key: &str) -> Result<bool>;

    /// Append a message row, returning its generated id.
    async fn insert_message(&self, message: &NewMessage) -> Result<i64>;

    /// Fetch a message by its generated row id, scoped to a user.
    async fn message_by_id(&self, id: i64, user_id: i64) -> Result<Option<StoredMessage>>;

    /// Conversation between the account and one contact, newest first.
    async fn conversation(
        &self,
        user_id: i64,
        contact_party: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>>;

    /// Refresh an existing contact's last-seen timestamp, or insert a new
    /// row. Returns the generated id only for a new insert.
    async fn upsert_contact(&self, contact: &NewContact) -> Result<Option<i64>>;

    /// All contacts for a user, most recently seen first.
    async fn contacts_by_user(&self, user_id: i64) -> Result<Vec<ContactRecord>>;

    /// Set a contact's alias. Returns false if no such row.
    async fn update_contact_alias(&self, id: i64, user_id: i64, alias: &str) -> Result<bool>;

    /// Persist a session record once per (user_id, phone_number). Returns
    /// the generated id only for a new insert.
    async fn save_session(&self, session: &NewSessionRecord) -> Result<Option<i64>>;

    /// All persisted session records for a user.
    async fn sessions_by_user(&self, user_id: i64) -> Result<Vec<SessionRecord>>;
}
