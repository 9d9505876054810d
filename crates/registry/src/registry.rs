use std::{collections::HashMap, sync::RwLock};

use serde::Serialize;

use crate::{Error, Result};

/// Lifecycle state of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Initializing,
    AwaitingScan,
    Connected,
    Reconnecting,
    Terminated,
}

/// One live session. Exactly one entry exists per effective key.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub session_key: String,
    pub user_id: i64,
    /// Set once authentication completes.
    pub phone_number: Option<String>,
    /// Full account JID reported by the engine.
    pub account_jid: Option<String>,
    pub state: ConnectionState,
    /// Rendered QR data URL while awaiting scan. Excluded from listings,
    /// served through its own endpoint.
    #[serde(skip_serializing)]
    pub qr_image: Option<String>,
    pub reconnect_count: u32,
}

/// Pending-index record: recovers the original key after a rekeyed session
/// is later invalidated by logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub user_id: i64,
    pub original_session_key: String,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, SessionEntry>,
    pending: HashMap<String, PendingSession>,
}

/// Keyed store of session state, shared across all session handlers.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry in state INITIALIZING. Fails if the key is live.
    pub fn register(&self, session_key: &str, user_id: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.entries.contains_key(session_key) {
            return Err(Error::conflict(session_key));
        }
        inner.entries.insert(
            session_key.to_string(),
            SessionEntry {
                session_key: session_key.to_string(),
                user_id,
                phone_number: None,
                account_jid: None,
                state: ConnectionState::Initializing,
                qr_image: None,
                reconnect_count: 0,
            },
        );
        inner.pending.insert(
            session_key.to_string(),
            PendingSession {
                user_id,
                original_session_key: session_key.to_string(),
            },
        );
        Ok(())
    }

    /// Atomically move an entry and its pending record to `new_key`,
    /// preserving user, QR image and reconnect count. The pending record
    /// keeps its original key. No-op when `old_key` is absent.
    pub fn rekey(&self, old_key: &str, new_key: &str) -> bool {
        if old_key == new_key {
            return true;
        }
        let mut inner = self.inner.write().unwrap();
        let Some(mut entry) = inner.entries.remove(old_key) else {
            return false;
        };
        entry.session_key = new_key.to_string();
        inner.entries.insert(new_key.to_string(), entry);
        if let Some(pending) = inner.pending.remove(old_key) {
            inner.pending.insert(new_key.to_string(), pending);
        }
        true
    }

    /// Snapshot of an entry.
    pub fn get(&self, session_key: &str) -> Option<SessionEntry> {
        self.inner.read().unwrap().entries.get(session_key).cloned()
    }

    /// Remove an entry and its pending mirror.
    pub fn remove(&self, session_key: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.remove(session_key);
        inner.pending.remove(session_key);
    }

    /// All live entries for a user.
    pub fn list_by_user(&self, user_id: i64) -> Vec<SessionEntry> {
        self.inner
            .read()
            .unwrap()
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Effective key for a session registered under `original_key`. After a
    /// rekey the pending record still names the original key, so ingestion
    /// can resolve events arriving on the pre-auth key.
    pub fn resolve_pending(&self, original_key: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .pending
            .iter()
            .find(|(_, p)| p.original_session_key == original_key)
            .map(|(k, _)| k.clone())
    }

    /// Store a QR challenge and move to AWAITING_SCAN.
    pub fn set_qr(&self, session_key: &str, image: String) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.entries.get_mut(session_key) {
            Some(entry) if entry.state != ConnectionState::Terminated => {
                entry.qr_image = Some(image);
                entry.state = ConnectionState::AwaitingScan;
                true
            },
            _ => false,
        }
    }

    /// Record a successful authentication: phone, account JID, CONNECTED
    /// state, reconnect counter reset.
    pub fn mark_connected(&self, session_key: &str, phone_number: &str, account_jid: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.entries.get_mut(session_key) {
            Some(entry) => {
                entry.phone_number = Some(phone_number.to_string());
                entry.account_jid = Some(account_jid.to_string());
                entry.state = ConnectionState::Connected;
                entry.reconnect_count = 0;
                true
            },
            None => false,
        }
    }

    /// Move to RECONNECTING and return the incremented attempt count.
    pub fn mark_reconnecting(&self, session_key: &str) -> Option<u32> {
        let mut inner = self.inner.write().unwrap();
        inner.entries.get_mut(session_key).map(|entry| {
            entry.state = ConnectionState::Reconnecting;
            entry.reconnect_count += 1;
            entry.reconnect_count
        })
    }

    /// Terminal-logout bookkeeping, in one atomic step: drop the entry at
    /// `current_key`, then search the pending index for the record whose
    /// original key matches `original_key`. When found the record is
    /// consumed and returned so the caller can restart under the original
    /// key; otherwise the mirror at `current_key` is cleared and the
    /// session stays terminated.
    pub fn finish_logout(&self, current_key: &str, original_key: &str) -> Option<PendingSession> {
        let mut inner = self.inner.write().unwrap();
        inner.entries.remove(current_key);
        let found = inner
            .pending
            .iter()
            .find(|(_, p)| p.original_session_key == original_key)
            .map(|(k, _)| k.clone());
        match found {
            Some(key) => inner.pending.remove(&key),
            None => {
                inner.pending.remove(current_key);
                None
            },
        }
    }
}
