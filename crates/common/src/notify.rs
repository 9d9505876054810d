use {async_trait::async_trait, serde_json::Value};

/// Event names broadcast over the realtime channel.
///
/// These are part of the wire contract with frontends; renaming one is a
/// breaking change for every subscriber.
pub mod events {
    pub const QR_CODE: &str = "qr_code";
    pub const CONNECTION_STATUS: &str = "connection_status";
    pub const SESSION_DISCONNECTED: &str = "session_disconnected";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const NEW_MESSAGE_NOTIFY: &str = "new_message_notify";
    pub const NEW_CONTACT: &str = "new_contact";
    pub const MESSAGE_UPDATE: &str = "message_update";
    pub const ERROR: &str = "error";
}

/// Sink for realtime events — the gateway provides the concrete
/// WebSocket-backed implementation; tests substitute recorders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Broadcast an event to all connected subscribers.
    async fn emit(&self, event: &str, payload: Value);
}

/// Notifier that discards everything.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn emit(&self, _event: &str, _payload: Value) {}
}
