//! Connection supervisor: one receive loop per session, driving the
//! lifecycle state machine against engine events.
//!
//! Only session construction is a caller-visible failure. Everything after
//! that — QR churn, rekeying, reconnection, logout recovery — is
//! self-contained: handled inside the loop, surfaced to observers through
//! the notifier, never raised to a caller.

pub mod error;
pub mod supervisor;

pub use {
    error::{Error, Result},
    supervisor::Supervisor,
};
