//! Message ingestion pipeline.
//!
//! Every inbound message event, live or replayed from history, passes the
//! same ordered gates: effective-key resolution, validation, dedup,
//! staleness, classification, persist, contact upsert, media dispatch.
//! Failing a gate drops the event without persisting; only infrastructure
//! failures surface as errors, and the caller swallows those so one bad
//! event never halts the stream.

pub mod error;
pub mod outcome;
pub mod pipeline;

pub use {
    error::{Error, Result},
    outcome::IngestOutcome,
    pipeline::IngestPipeline,
};
