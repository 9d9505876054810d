//! In-memory session registry and pending-session index.
//!
//! The registry is the single owner of live-session state. Every mutation,
//! including multi-step sequences like rekeying, runs under one lock
//! acquisition with no await points, so concurrent session handlers never
//! observe a half-applied transition.

pub mod error;
pub mod registry;

pub use {
    error::{Error, Result},
    registry::{ConnectionState, PendingSession, SessionEntry, SessionRegistry},
};
