use futures::stream::BoxStream;

use crate::types::{EngineOutput, RequestId, SamplingConfig};

/// Text generation engine hook.
///
/// This keeps lmgate-infer independent from a specific inference engine.
/// `generate` yields cumulative snapshots and ends when the engine stops
/// (stop sequence or token cap). `abort` must tolerate ids it no longer knows.
pub trait TextBackend: Send + Sync + 'static {
    fn generate(
        &self,
        prompt: String,
        sampling: SamplingConfig,
        request_id: RequestId,
    ) -> BoxStream<'static, crate::Result<EngineOutput>>;

    fn abort(&self, request_id: RequestId);
}
