use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::EngineHandle;
use crate::stream::{DeltaEncoder, SourceEvent};
use crate::types::{RequestId, StreamChunk};

/// How to stop the producer once the consumer is gone.
#[derive(Clone, Debug)]
pub enum CancelAction {
    AbortEngine(EngineHandle),
    /// The worker thread keeps running until its model call returns; it only
    /// stops publishing.
    CancelWorker(CancellationToken),
}

impl CancelAction {
    async fn run(self, request_id: RequestId) {
        match self {
            Self::AbortEngine(engine) => {
                if let Err(e) = engine.abort(request_id).await {
                    warn!(%request_id, error = %e, "failed to abort engine request");
                }
            }
            Self::CancelWorker(token) => token.cancel(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    Completed { text: String },
    Cancelled,
    Errored(String),
}

pub struct StreamingAdapter<S> {
    request_id: RequestId,
    source: S,
    encoder: DeltaEncoder,
    cancel: CancelAction,
    done_marker: bool,
}

impl<S> StreamingAdapter<S>
where
    S: Stream<Item = SourceEvent> + Unpin,
{
    pub fn new(request_id: RequestId, source: S, cancel: CancelAction) -> Self {
        Self {
            request_id,
            source,
            encoder: DeltaEncoder::new(),
            cancel,
            done_marker: false,
        }
    }

    /// Ends a successful stream with `{"done":true}`.
    pub fn with_done_marker(mut self, enabled: bool) -> Self {
        self.done_marker = enabled;
        self
    }

    /// Forwards deltas into `sink` until the source ends, fails, or the
    /// receiving side of `sink` is dropped.
    pub async fn run(mut self, sink: mpsc::Sender<StreamChunk>) -> StreamOutcome {
        let mut emitted = 0usize;
        loop {
            let event = tokio::select! {
                biased;
                _ = sink.closed() => return self.cancelled(emitted).await,
                event = self.source.next() => event,
            };

            match event {
                Some(SourceEvent::Text(cumulative)) => {
                    let Some(delta) = self.encoder.push(&cumulative) else {
                        continue;
                    };
                    if sink.send(StreamChunk::Response(delta)).await.is_err() {
                        return self.cancelled(emitted).await;
                    }
                    emitted += 1;
                }
                Some(SourceEvent::Failed(message)) => {
                    let _ = sink.send(StreamChunk::Error(message.clone())).await;
                    return StreamOutcome::Errored(message);
                }
                None => {
                    if self.done_marker {
                        let _ = sink.send(StreamChunk::Done(true)).await;
                    }
                    return StreamOutcome::Completed {
                        text: self.encoder.into_text(),
                    };
                }
            }
        }
    }

    async fn cancelled(self, emitted: usize) -> StreamOutcome {
        info!(request_id = %self.request_id, emitted, "stream consumer disconnected");
        self.cancel.run(self.request_id).await;
        StreamOutcome::Cancelled
    }
}
