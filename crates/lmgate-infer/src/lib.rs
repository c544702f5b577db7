//! Request orchestration in front of a text LLM engine and a vision model.
//!
//! This crate provides:
//! - an actor-style engine runtime with per-request abort;
//! - a lazily loaded, process-wide vision model cell;
//! - a thread-to-async bridge that turns cumulative generations into NDJSON deltas;
//! - a sequential image batch orchestrator with per-item failure isolation;
//! - the axum router exposing all of it.

pub mod api;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod init;
pub mod lifecycle;
pub mod server;
pub mod stream;
pub mod types;
pub mod vision;

pub use engine::{EngineCommand, EngineHandle, EngineRuntime, TextBackend};
pub use error::{Error, Result};
pub use server::{AppState, RouterBuilder};
pub use types::SamplingConfig;
pub use vision::{VisionCell, VisionLoader, VisionModel};
