//! Sequential image batches with per-item failure isolation.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::types::{GenerationRequest, RequestId};
use crate::vision::{VisionHandle, decode_image, generate_blocking};

/// One uploaded file as it came off the multipart body.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("<unnamed>")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Response(String),
    Error(String),
}

impl ItemOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// `{filename, response}` or `{filename, error}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchResult {
    pub filename: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Started,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemResultEvent {
    pub index: usize,
    pub filename: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Meta {
        count: usize,
        model: String,
        max_new_tokens: usize,
    },
    Progress {
        index: usize,
        filename: Option<String>,
        status: ItemStatus,
    },
    Result(ItemResultEvent),
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed { items: usize, failed: usize },
    Cancelled { processed: usize },
}

#[derive(Clone, Debug)]
pub struct BatchParams {
    pub prompt: String,
    pub max_new_tokens: usize,
    pub model_name: String,
    pub system_prompt: String,
}

/// Drives one vision generation per upload, strictly in order.
pub struct BatchOrchestrator {
    request_id: RequestId,
    vision: Arc<VisionHandle>,
    params: BatchParams,
}

impl BatchOrchestrator {
    pub fn new(request_id: RequestId, vision: Arc<VisionHandle>, params: BatchParams) -> Self {
        Self {
            request_id,
            vision,
            params,
        }
    }

    pub fn meta(&self, count: usize) -> BatchEvent {
        BatchEvent::Meta {
            count,
            model: self.params.model_name.clone(),
            max_new_tokens: self.params.max_new_tokens,
        }
    }

    /// Processes every upload and returns one result per upload, in order.
    pub async fn run(&self, uploads: &[ImageUpload]) -> Vec<BatchResult> {
        futures::stream::iter(uploads.iter().enumerate())
            .then(|(index, upload)| async move {
                BatchResult {
                    filename: upload.filename.clone(),
                    outcome: self.run_item(index, upload).await,
                }
            })
            .collect::<Vec<_>>()
            .await
    }

    /// Same fold as [`run`](Self::run), publishing `meta`, then `progress` and
    /// `result` per item, then `done`. Stops early once `sink` is closed.
    pub async fn run_streaming(
        &self,
        uploads: &[ImageUpload],
        sink: mpsc::Sender<BatchEvent>,
    ) -> BatchOutcome {
        if sink.send(self.meta(uploads.len())).await.is_err() {
            return self.cancelled(0);
        }

        let mut failed = 0usize;
        for (index, upload) in uploads.iter().enumerate() {
            let progress = BatchEvent::Progress {
                index,
                filename: upload.filename.clone(),
                status: ItemStatus::Started,
            };
            if sink.send(progress).await.is_err() {
                return self.cancelled(index);
            }

            let outcome = tokio::select! {
                biased;
                _ = sink.closed() => return self.cancelled(index),
                outcome = self.run_item(index, upload) => outcome,
            };
            if outcome.is_error() {
                failed += 1;
            }

            let result = BatchEvent::Result(ItemResultEvent {
                index,
                filename: upload.filename.clone(),
                outcome,
            });
            if sink.send(result).await.is_err() {
                return self.cancelled(index + 1);
            }
        }

        let _ = sink.send(BatchEvent::Done).await;
        BatchOutcome::Completed {
            items: uploads.len(),
            failed,
        }
    }

    async fn run_item(&self, index: usize, upload: &ImageUpload) -> ItemOutcome {
        let name = upload.display_name();
        if upload.bytes.is_empty() {
            return self.item_failed(index, name, format!("Empty image upload: {name}"));
        }

        let image = match decode_image(&upload.bytes) {
            Ok(image) => image,
            Err(e) => return self.item_failed(index, name, e.detail()),
        };

        let request = GenerationRequest::image(
            self.request_id,
            self.params.system_prompt.clone(),
            self.params.prompt.clone(),
            image,
            self.params.max_new_tokens,
        );
        match generate_blocking(self.vision.clone(), request).await {
            Ok(text) => ItemOutcome::Response(text),
            Err(e) => self.item_failed(index, name, e.detail()),
        }
    }

    fn item_failed(&self, index: usize, filename: &str, message: String) -> ItemOutcome {
        error!(request_id = %self.request_id, index, filename, error = %message, "batch item failed");
        ItemOutcome::Error(message)
    }

    fn cancelled(&self, processed: usize) -> BatchOutcome {
        info!(request_id = %self.request_id, processed, "batch consumer disconnected");
        BatchOutcome::Cancelled { processed }
    }
}
