//! Protocol-engine contract and the Baileys sidecar client.
//!
//! The engine performs the actual wire handshake, encryption and transport;
//! zapgate consumes it through the traits in [`traits`]. [`sidecar`] is the
//! production implementation: a WebSocket client for a Node sidecar process
//! speaking a small JSON frame protocol.

pub mod error;
pub mod jid;
pub mod sidecar;
pub mod traits;
pub mod types;

pub use {
    error::{Error, Result},
    sidecar::SidecarEngine,
    traits::{
        DisconnectReason, EngineEvent, EngineHandle, EngineIdentity, EngineSession, MediaFetcher,
        MediaSource, OutboundMedia, ProtocolEngine, SentReceipt, SessionConfig,
    },
    types::{InboundMessage, MediaKind, MediaPart, MediaRequest, MessageKey, MessagePayload},
};
