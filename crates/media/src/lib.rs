//! Media resolution: MIME mapping, decrypt-and-fetch through the engine,
//! and materialization under the uploads directory.
//!
//! Local media files are disposable. Everything needed to regenerate one
//! lives in the persisted message row, so [`MediaResolver::redownload`] can
//! rebuild the bytes without re-contacting the original sender.

pub mod error;
pub mod mime;
pub mod resolver;

pub use {
    error::{Error, Result},
    resolver::{MediaAsset, MediaResolver},
};
