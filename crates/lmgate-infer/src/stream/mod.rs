//! Turning cumulative generations into NDJSON delta chunks.
//!
//! Producers (the engine pump task or a vision worker thread) publish the
//! whole text generated so far. [`StreamingAdapter`] differences consecutive
//! snapshots, forwards non-empty deltas in order, and reacts to the consumer
//! going away.

mod adapter;
mod delta;
mod worker;

pub use adapter::{CancelAction, StreamOutcome, StreamingAdapter};
pub use delta::DeltaEncoder;
pub use worker::{SourceEvent, engine_source, spawn_vision_worker};
