//! Persistence layer: append-only message log, contact directory and
//! session records, behind the [`Store`] trait.
//!
//! [`SqliteStore`] is the production implementation. Connections come from a
//! pool with scoped lifetime per operation, so every exit path releases its
//! connection.

pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use {
    error::{Error, Result},
    sqlite::SqliteStore,
    store::Store,
    types::{ContactRecord, NewContact, NewMessage, NewSessionRecord, SessionRecord, StoredMessage},
};
