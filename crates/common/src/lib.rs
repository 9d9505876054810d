//! Shared contracts and helpers used across all zapgate crates.

pub mod notify;
pub mod time;

pub use notify::{NoopNotifier, Notifier, events};
