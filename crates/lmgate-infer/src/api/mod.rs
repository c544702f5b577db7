pub mod validation;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::batch::{BatchEvent, BatchOrchestrator, BatchOutcome, BatchParams, ImageUpload};
use crate::config::BackendConfig;
use crate::engine::EngineHandle;
use crate::lifecycle::{RequestLifecycle, RouteKind};
use crate::server::{
    BatchDescribeResponse, DescribeImageBatchForm, DescribeImageForm, DescribeImageResponse,
    PredictRequest, PredictResponse,
};
use crate::stream::{
    CancelAction, SourceEvent, StreamOutcome, StreamingAdapter, engine_source,
    spawn_vision_worker,
};
use crate::types::{
    EngineEvent, EngineOutput, GenerationRequest, GenerationResult, RequestId, StreamChunk,
};
use crate::vision::{VisionCell, decode_image, generate_blocking};
use validation::{
    DEFAULT_BATCH_PROMPT, DEFAULT_IMAGE_PROMPT, parse_max_new_tokens, resolve_image_prompt,
    validate_prompt, validate_upload, validate_uploads,
};

/// Route logic independent of HTTP extraction. Every entry point validates
/// fully before touching the engine or the vision model.
#[derive(Clone)]
pub struct ApiService {
    cfg: Arc<BackendConfig>,
    engine: EngineHandle,
    vision: Arc<VisionCell>,
}

/// A started stream: the request id plus the receiving end its producer task feeds.
#[derive(Debug)]
pub struct StreamRun<T> {
    pub request_id: RequestId,
    pub rx: mpsc::Receiver<T>,
}

impl ApiService {
    pub fn new(cfg: Arc<BackendConfig>, engine: EngineHandle, vision: Arc<VisionCell>) -> Self {
        Self {
            cfg,
            engine,
            vision,
        }
    }

    pub async fn predict(&self, req: PredictRequest) -> crate::Result<PredictResponse> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::Predict);
        let prompt = lifecycle.track(validate_prompt(req.prompt.as_deref()))?;
        lifecycle.dispatch()?;

        let request = self.text_request(lifecycle.id(), &prompt);
        let rx = lifecycle.track(
            self.engine
                .submit(request.prompt, request.sampling, request.request_id)
                .await,
        )?;
        lifecycle.begin_computing()?;

        let output = lifecycle.track(collect_last_output(rx).await)?;
        let result = GenerationResult::new(output, lifecycle.elapsed());
        lifecycle.complete()?;
        Ok(PredictResponse::from(&result))
    }

    pub async fn predict_stream(
        &self,
        req: PredictRequest,
    ) -> crate::Result<StreamRun<StreamChunk>> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::PredictStream);
        let prompt = lifecycle.track(validate_prompt(req.prompt.as_deref()))?;
        lifecycle.dispatch()?;

        let request = self.text_request(lifecycle.id(), &prompt);
        let rx = lifecycle.track(
            self.engine
                .submit(request.prompt, request.sampling, request.request_id)
                .await,
        )?;
        lifecycle.begin_streaming()?;

        let adapter = StreamingAdapter::new(
            lifecycle.id(),
            engine_source(rx),
            CancelAction::AbortEngine(self.engine.clone()),
        );
        Ok(self.spawn_delta_stream(lifecycle, adapter))
    }

    pub async fn describe_image(
        &self,
        form: DescribeImageForm,
    ) -> crate::Result<DescribeImageResponse> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::DescribeImage);
        let (upload, request) = lifecycle.track(self.image_request(lifecycle.id(), form))?;
        let max_new_tokens = request.sampling.max_tokens;
        lifecycle.dispatch()?;

        let vision = lifecycle.track(self.vision.acquire().await)?;
        lifecycle.begin_computing()?;
        let text = lifecycle.track(generate_blocking(vision, request).await)?;
        lifecycle.complete()?;

        Ok(DescribeImageResponse {
            response: text,
            model: self.cfg.model_name.clone(),
            filename: upload.filename,
            max_new_tokens,
        })
    }

    pub async fn describe_image_stream(
        &self,
        form: DescribeImageForm,
    ) -> crate::Result<StreamRun<StreamChunk>> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::DescribeImageStream);
        let (_upload, request) = lifecycle.track(self.image_request(lifecycle.id(), form))?;
        lifecycle.dispatch()?;

        let vision = lifecycle.track(self.vision.acquire().await)?;
        let token = CancellationToken::new();
        let worker_rx = lifecycle.track(spawn_vision_worker(
            vision,
            request,
            token.clone(),
            self.cfg.stream_buffer,
        ))?;
        lifecycle.begin_streaming()?;

        let adapter = StreamingAdapter::new(
            lifecycle.id(),
            tokio_stream::wrappers::ReceiverStream::new(worker_rx),
            CancelAction::CancelWorker(token),
        );
        Ok(self.spawn_delta_stream(lifecycle, adapter))
    }

    pub async fn describe_image_batch(
        &self,
        form: DescribeImageBatchForm,
    ) -> crate::Result<BatchDescribeResponse> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::DescribeImageBatch);
        let params = lifecycle.track(self.batch_params(&form))?;
        let max_new_tokens = params.max_new_tokens;
        lifecycle.dispatch()?;

        let vision = lifecycle.track(self.vision.acquire().await)?;
        lifecycle.begin_computing()?;
        let orchestrator = BatchOrchestrator::new(lifecycle.id(), vision, params);
        let results = orchestrator.run(&form.files).await;
        lifecycle.complete()?;

        Ok(BatchDescribeResponse {
            results,
            model: self.cfg.model_name.clone(),
            max_new_tokens,
        })
    }

    pub async fn describe_image_batch_stream(
        &self,
        form: DescribeImageBatchForm,
    ) -> crate::Result<StreamRun<BatchEvent>> {
        let mut lifecycle = RequestLifecycle::new(RouteKind::DescribeImageBatchStream);
        let params = lifecycle.track(self.batch_params(&form))?;
        lifecycle.dispatch()?;

        let vision = lifecycle.track(self.vision.acquire().await)?;
        lifecycle.begin_streaming()?;

        let request_id = lifecycle.id();
        let orchestrator = BatchOrchestrator::new(request_id, vision, params);
        let (tx, rx) = mpsc::channel(self.cfg.stream_buffer.max(1));
        tokio::spawn(async move {
            let outcome = orchestrator.run_streaming(&form.files, tx).await;
            let finished = match outcome {
                BatchOutcome::Completed { .. } => lifecycle.complete(),
                BatchOutcome::Cancelled { .. } => lifecycle.cancel(),
            };
            if let Err(e) = finished {
                warn!(%request_id, error = %e, "batch lifecycle out of order");
            }
        });
        Ok(StreamRun { request_id, rx })
    }

    fn text_request(&self, request_id: RequestId, prompt: &str) -> GenerationRequest {
        GenerationRequest::text(
            request_id,
            format_gemma_prompt(prompt),
            self.cfg.text_sampling.clone(),
        )
    }

    fn image_request(
        &self,
        request_id: RequestId,
        form: DescribeImageForm,
    ) -> crate::Result<(ImageUpload, GenerationRequest)> {
        let upload = validate_upload(form.file)?;
        let prompt = resolve_image_prompt(form.prompt, DEFAULT_IMAGE_PROMPT)?;
        let max_new_tokens = parse_max_new_tokens(
            form.max_new_tokens.as_deref(),
            self.cfg.default_max_new_tokens,
        )?;
        let image = decode_image(&upload.bytes)?;

        let request = GenerationRequest::image(
            request_id,
            self.cfg.vision_system_prompt.clone(),
            prompt,
            image,
            max_new_tokens,
        );
        Ok((upload, request))
    }

    fn batch_params(&self, form: &DescribeImageBatchForm) -> crate::Result<BatchParams> {
        validate_uploads(&form.files)?;
        let prompt = resolve_image_prompt(form.prompt.clone(), DEFAULT_BATCH_PROMPT)?;
        let max_new_tokens = parse_max_new_tokens(
            form.max_new_tokens.as_deref(),
            self.cfg.default_max_new_tokens,
        )?;
        Ok(BatchParams {
            prompt,
            max_new_tokens,
            model_name: self.cfg.model_name.clone(),
            system_prompt: self.cfg.vision_system_prompt.clone(),
        })
    }

    fn spawn_delta_stream<S>(
        &self,
        mut lifecycle: RequestLifecycle,
        adapter: StreamingAdapter<S>,
    ) -> StreamRun<StreamChunk>
    where
        S: tokio_stream::Stream<Item = SourceEvent> + Unpin + Send + 'static,
    {
        let request_id = lifecycle.id();
        let adapter = adapter.with_done_marker(self.cfg.stream_done_marker);
        let (tx, rx) = mpsc::channel(self.cfg.stream_buffer.max(1));
        tokio::spawn(async move {
            let outcome: StreamOutcome = adapter.run(tx).await;
            if let Err(e) = lifecycle.finish_stream(&outcome) {
                warn!(%request_id, error = %e, "stream lifecycle out of order");
            }
        });
        StreamRun { request_id, rx }
    }
}

/// Wraps a user prompt in the Gemma chat turn markers.
pub fn format_gemma_prompt(prompt: &str) -> String {
    format!("<start_of_turn>user\n{prompt}<end_of_turn>\n<start_of_turn>model\n")
}

/// Drains an engine channel and keeps the last snapshot. A channel that
/// closes without `Done` was aborted by the runtime.
pub async fn collect_last_output(
    mut rx: mpsc::Receiver<EngineEvent>,
) -> crate::Result<EngineOutput> {
    let mut last = None;
    loop {
        match rx.recv().await {
            Some(EngineEvent::Output(output)) => last = Some(output),
            Some(EngineEvent::Done) => break,
            Some(EngineEvent::Error(message)) => return Err(crate::Error::engine(message)),
            None => return Err(crate::Error::cancelled("generation aborted before completion")),
        }
    }
    last.ok_or_else(|| crate::Error::engine("No output generated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemma_prompt_has_turn_markers() {
        assert_eq!(
            format_gemma_prompt("2+2=?"),
            "<start_of_turn>user\n2+2=?<end_of_turn>\n<start_of_turn>model\n"
        );
    }

    #[tokio::test]
    async fn collect_keeps_last_snapshot() {
        let (tx, rx) = mpsc::channel(8);
        for text in ["4", "4."] {
            tx.send(EngineEvent::Output(EngineOutput {
                text: text.into(),
                prompt_tokens: 5,
                completion_tokens: text.len(),
                finished: false,
            }))
            .await
            .unwrap();
        }
        tx.send(EngineEvent::Done).await.unwrap();

        let out = collect_last_output(rx).await.unwrap();
        assert_eq!(out.text, "4.");
        assert_eq!(out.completion_tokens, 2);
    }

    #[tokio::test]
    async fn collect_without_output_is_an_engine_error() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(EngineEvent::Done).await.unwrap();
        let err = collect_last_output(rx).await.expect_err("no output");
        assert!(!err.is_client_error());
        assert_eq!(err.detail(), "No output generated");
    }

    #[tokio::test]
    async fn collect_reports_an_aborted_channel_as_cancelled() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(EngineEvent::Output(EngineOutput::default()))
            .await
            .unwrap();
        drop(tx);
        let err = collect_last_output(rx).await.expect_err("aborted");
        assert!(matches!(err, crate::Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn collect_surfaces_engine_errors() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(EngineEvent::Error("KV cache exhausted".into()))
            .await
            .unwrap();
        let err = collect_last_output(rx).await.expect_err("engine error");
        assert_eq!(err.detail(), "KV cache exhausted");
    }
}
