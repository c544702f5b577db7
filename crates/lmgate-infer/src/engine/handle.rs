use tokio::sync::{mpsc, oneshot};

use crate::types::{EngineEvent, RequestId, SamplingConfig};

#[derive(Debug)]
pub enum EngineCommand {
    Submit {
        prompt: String,
        sampling: SamplingConfig,
        request_id: RequestId,
        reply: oneshot::Sender<crate::Result<mpsc::Receiver<EngineEvent>>>,
    },
    Abort {
        request_id: RequestId,
    },
}

#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// Starts a generation. The receiver yields cumulative outputs, then
    /// `Done` or a single `Error`.
    pub async fn submit(
        &self,
        prompt: String,
        sampling: SamplingConfig,
        request_id: RequestId,
    ) -> crate::Result<mpsc::Receiver<EngineEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Submit {
                prompt,
                sampling,
                request_id,
                reply: reply_tx,
            })
            .await
            .map_err(|e| crate::Error::internal(format!("engine channel closed: {e}")))?;

        reply_rx
            .await
            .map_err(|e| crate::Error::internal(format!("engine reply dropped: {e}")))?
    }

    /// Stops forwarding output for `request_id` and releases it in the backend.
    /// Unknown or finished ids are ignored.
    pub async fn abort(&self, request_id: RequestId) -> crate::Result<()> {
        self.tx
            .send(EngineCommand::Abort { request_id })
            .await
            .map_err(|e| crate::Error::internal(format!("engine channel closed: {e}")))?;
        Ok(())
    }
}
