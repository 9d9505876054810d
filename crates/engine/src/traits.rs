//! Seams between zapgate and the protocol engine.

use std::{path::PathBuf, sync::Arc};

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    Result, jid,
    types::{InboundMessage, MediaKind, MediaRequest},
};

/// Parameters for bringing a session up.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_key: String,
    pub user_id: i64,
}

/// The authenticated account identity reported on connection open.
#[derive(Debug, Clone)]
pub struct EngineIdentity {
    /// Full account JID, e.g. `5511999990000:12@s.whatsapp.net`.
    pub jid: String,
}

impl EngineIdentity {
    /// Bare phone number extracted from the JID.
    pub fn phone_number(&self) -> String {
        jid::phone_part(&self.jid).to_string()
    }
}

/// Why a connection closed.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// Credentials were invalidated remotely; the session cannot resume.
    LoggedOut,
    /// Transient failure; reconnecting may succeed.
    Recoverable { message: String },
}

impl DisconnectReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Events delivered on a session's inbound channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    QrChallenge { image: String },
    ConnectionOpen { identity: EngineIdentity },
    ConnectionClose { reason: DisconnectReason },
    CredentialsUpdated,
    MessageReceived(InboundMessage),
    /// Replayed history batch delivered after (re)connection.
    HistorySync { messages: Vec<InboundMessage> },
}

/// Receipt for an accepted outbound send.
#[derive(Debug, Clone)]
pub struct SentReceipt {
    pub message_id: String,
}

/// Where outbound media bytes come from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// An outbound media send.
#[derive(Debug, Clone)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub duration_secs: Option<u32>,
}

/// A live session: its inbound event channel plus the control handle.
pub struct EngineSession {
    pub events: mpsc::Receiver<EngineEvent>,
    pub handle: Arc<dyn EngineHandle>,
}

/// Entry point: open a session against the engine.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Request a session. Construction failure here is the only fatal,
    /// caller-visible error path of session startup.
    async fn connect(&self, config: SessionConfig) -> Result<EngineSession>;
}

/// Per-session control surface.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<SentReceipt>;
    async fn send_media(&self, to: &str, media: OutboundMedia) -> Result<SentReceipt>;
    /// Persist updated credentials. Invoked synchronously relative to the
    /// credential-update event, no batching.
    async fn save_credentials(&self) -> Result<()>;
    /// Purge stored credentials on terminal logout.
    async fn remove_credentials(&self) -> Result<()>;
}

/// Authenticated decrypt-and-fetch capability for media payloads.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn download_media(&self, request: &MediaRequest) -> Result<Vec<u8>>;
}
