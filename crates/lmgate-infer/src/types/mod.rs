mod output;
mod request;
mod sampling;

pub use output::{EngineEvent, EngineOutput, GenerationResult, StreamChunk};
pub use request::{GenerationRequest, RequestId};
pub use sampling::SamplingConfig;
