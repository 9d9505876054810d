use serde::Serialize;

/// A message row about to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub sender_party: String,
    pub recipient_party: String,
    pub content: String,
    pub kind: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub session_key: String,
    pub phone_number: String,
    pub account_jid: String,
    pub user_id: i64,
}

/// A persisted message row. Unique on (message_id, session_key); never
/// mutated after insert.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub message_id: String,
    pub sender_party: String,
    pub recipient_party: String,
    pub content: String,
    pub kind: String,
    pub timestamp: i64,
    pub session_key: String,
    pub phone_number: String,
    pub account_jid: String,
    pub user_id: i64,
}

/// A contact about to be upserted into the directory.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub contact_party: String,
    pub user_id: i64,
    pub phone_number: String,
    pub jid: String,
}

/// A contact directory row. Unique on (contact_party, user_id,
/// phone_number); `alias` is user-editable out of band.
#[derive(Debug, Clone, Serialize)]
pub struct ContactRecord {
    pub id: i64,
    pub contact_party: String,
    pub user_id: i64,
    pub phone_number: String,
    pub jid: String,
    pub alias: Option<String>,
    /// Epoch milliseconds of the last message seen from this contact.
    pub last_seen: i64,
}

/// A session record about to be persisted after authentication.
#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub user_id: i64,
    pub phone_number: String,
    /// The key the session was originally started under.
    pub session_key: String,
}

/// A persisted session row. Unique on (user_id, phone_number).
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub phone_number: String,
    pub session_key: String,
}
