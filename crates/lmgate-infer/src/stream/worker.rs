use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::types::{EngineEvent, GenerationRequest};
use crate::vision::VisionHandle;

/// What a producer hands to the adapter. Channel closure means end of stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    Text(String),
    Failed(String),
}

impl SourceEvent {
    fn from_engine(event: EngineEvent) -> Option<Self> {
        match event {
            EngineEvent::Output(output) => Some(Self::Text(output.text)),
            EngineEvent::Error(message) => Some(Self::Failed(message)),
            EngineEvent::Done => None,
        }
    }
}

/// Adapts an engine event channel into adapter input.
pub fn engine_source(
    rx: mpsc::Receiver<EngineEvent>,
) -> impl tokio_stream::Stream<Item = SourceEvent> + Unpin + Send + 'static {
    ReceiverStream::new(rx).filter_map(SourceEvent::from_engine)
}

/// Runs a blocking vision generation on its own thread.
///
/// The thread publishes every cumulative snapshot through a bounded channel,
/// so a slow consumer applies backpressure to generation. Cancelling `token`
/// makes the thread stop publishing; the model call itself runs to completion.
pub fn spawn_vision_worker(
    handle: Arc<VisionHandle>,
    request: GenerationRequest,
    token: CancellationToken,
    buffer: usize,
) -> crate::Result<mpsc::Receiver<SourceEvent>> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    std::thread::Builder::new()
        .name("vision-worker".to_string())
        .spawn(move || run_vision_worker(handle, request, token, tx))
        .map_err(|e| crate::Error::internal_with_source("failed to spawn vision worker", e))?;
    Ok(rx)
}

fn run_vision_worker(
    handle: Arc<VisionHandle>,
    request: GenerationRequest,
    token: CancellationToken,
    tx: mpsc::Sender<SourceEvent>,
) {
    let request_id = request.request_id;
    let mut forwarding = true;
    let result = handle.model.generate(&request, &mut |cumulative: &str| {
        if !forwarding {
            return;
        }
        if token.is_cancelled()
            || tx
                .blocking_send(SourceEvent::Text(cumulative.to_string()))
                .is_err()
        {
            forwarding = false;
        }
    });

    if token.is_cancelled() || !forwarding {
        debug!(%request_id, "vision worker finished after its consumer left");
        return;
    }

    let last = match result {
        // The adapter drops it if it matches the last snapshot.
        Ok(text) => SourceEvent::Text(text),
        Err(e) => {
            error!(%request_id, error = %e.format_chain(), "vision generation failed");
            SourceEvent::Failed(e.detail())
        }
    };
    let _ = tx.blocking_send(last);
}
