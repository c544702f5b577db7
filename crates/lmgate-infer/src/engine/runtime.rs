use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineCommand, EngineHandle, TextBackend};
use crate::types::{EngineEvent, EngineOutput, RequestId};

#[derive(Clone, Debug)]
pub struct EngineRuntimeConfig {
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for EngineRuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            event_buffer: 256,
        }
    }
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

/// Owns the in-flight request table. Every submitted generation is pumped by
/// its own task; the runtime loop only books requests in and out.
pub struct EngineRuntime {
    cfg: EngineRuntimeConfig,
    backend: Arc<dyn TextBackend>,
    in_flight: HashMap<RequestId, InFlight>,
    next_seq: u64,
    rx: mpsc::Receiver<EngineCommand>,
    finished_tx: mpsc::UnboundedSender<(RequestId, u64)>,
    finished_rx: mpsc::UnboundedReceiver<(RequestId, u64)>,
}

impl EngineRuntime {
    pub fn spawn(cfg: EngineRuntimeConfig, backend: Arc<dyn TextBackend>) -> EngineHandle {
        let (tx, rx) = mpsc::channel(cfg.command_buffer.max(1));
        let handle = EngineHandle::new(tx);
        let rt = Self::new(cfg, rx, backend);
        tokio::spawn(async move {
            rt.run().await;
        });
        handle
    }

    pub fn new(
        cfg: EngineRuntimeConfig,
        rx: mpsc::Receiver<EngineCommand>,
        backend: Arc<dyn TextBackend>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            backend,
            in_flight: HashMap::new(),
            next_seq: 0,
            rx,
            finished_tx,
            finished_rx,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some((request_id, seq)) = self.finished_rx.recv() => {
                    self.on_finished(request_id, seq);
                }
            }
        }

        for (request_id, entry) in self.in_flight.drain() {
            entry.token.cancel();
            self.backend.abort(request_id);
        }
        debug!("engine runtime stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Submit {
                prompt,
                sampling,
                request_id,
                reply,
            } => {
                if self.in_flight.contains_key(&request_id) {
                    warn!(%request_id, "rejecting submit for an id already in flight");
                    let _ = reply.send(Err(crate::Error::internal(format!(
                        "request id {request_id} is already in flight"
                    ))));
                    return;
                }

                self.next_seq += 1;
                let seq = self.next_seq;
                let token = CancellationToken::new();
                let (tx, rx) = mpsc::channel(self.cfg.event_buffer.max(1));

                let outputs = self.backend.generate(prompt, sampling, request_id);
                self.in_flight.insert(
                    request_id,
                    InFlight {
                        seq,
                        token: token.clone(),
                    },
                );

                let backend = self.backend.clone();
                let finished_tx = self.finished_tx.clone();
                tokio::spawn(async move {
                    pump_outputs(request_id, outputs, tx, token, backend).await;
                    let _ = finished_tx.send((request_id, seq));
                });

                debug!(%request_id, in_flight = self.in_flight.len(), "engine request submitted");
                let _ = reply.send(Ok(rx));
            }
            EngineCommand::Abort { request_id } => match self.in_flight.remove(&request_id) {
                Some(entry) => {
                    entry.token.cancel();
                    self.backend.abort(request_id);
                    info!(%request_id, "engine request aborted");
                }
                None => {
                    debug!(%request_id, "abort for unknown or finished request ignored");
                }
            },
        }
    }

    fn on_finished(&mut self, request_id: RequestId, seq: u64) {
        // A stale notice must not evict a newer request that reused the id.
        if self
            .in_flight
            .get(&request_id)
            .is_some_and(|entry| entry.seq == seq)
        {
            self.in_flight.remove(&request_id);
        }
    }
}

async fn pump_outputs(
    request_id: RequestId,
    mut outputs: BoxStream<'static, crate::Result<EngineOutput>>,
    tx: mpsc::Sender<EngineEvent>,
    token: CancellationToken,
    backend: Arc<dyn TextBackend>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = outputs.next() => next,
        };

        let event = match next {
            Some(Ok(output)) => EngineEvent::Output(output),
            Some(Err(e)) => {
                error!(%request_id, error = %e.format_chain(), "engine generation failed");
                let _ = tx.send(EngineEvent::Error(e.detail())).await;
                return;
            }
            None => {
                let _ = tx.send(EngineEvent::Done).await;
                return;
            }
        };

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = tx.send(event) => sent,
        };
        if sent.is_err() {
            // Consumer dropped without aborting; release the slot anyway.
            debug!(%request_id, "engine event receiver dropped");
            backend.abort(request_id);
            return;
        }
    }
}
