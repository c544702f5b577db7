mod backend;
mod handle;
mod runtime;

pub use backend::TextBackend;
pub use handle::{EngineCommand, EngineHandle};
pub use runtime::{EngineRuntime, EngineRuntimeConfig};
