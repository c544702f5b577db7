use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use lmgate_infer::config::EngineArgs;
use lmgate_infer::engine::{EngineRuntime, EngineRuntimeConfig, TextBackend};
use lmgate_infer::init::{backend_parts, init_cfg, init_log, log_level};
use lmgate_infer::types::{EngineOutput, GenerationRequest, RequestId, SamplingConfig};
use lmgate_infer::vision::{Device, VisionCell, VisionLoader, VisionModel};
use lmgate_infer::{AppState, RouterBuilder};

/// Echoes the prompt back word by word, as cumulative snapshots.
struct EchoBackend {
    args: EngineArgs,
}

impl TextBackend for EchoBackend {
    fn generate(
        &self,
        prompt: String,
        sampling: SamplingConfig,
        _request_id: RequestId,
    ) -> BoxStream<'static, lmgate_infer::Result<EngineOutput>> {
        let prompt_tokens = prompt.split_whitespace().count();
        let words: Vec<String> = prompt
            .split_whitespace()
            .filter(|w| !w.starts_with("<start_of_turn>") && !w.contains("<end_of_turn>"))
            .take(sampling.max_tokens.min(self.args.max_model_len))
            .map(str::to_string)
            .collect();
        let total = words.len();

        stream::iter(words.into_iter().enumerate())
            .scan(String::new(), move |text, (i, word)| {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&word);
                let output = EngineOutput {
                    text: text.clone(),
                    prompt_tokens,
                    completion_tokens: i + 1,
                    finished: i + 1 == total,
                };
                futures::future::ready(Some(Ok(output)))
            })
            .boxed()
    }

    fn abort(&self, request_id: RequestId) {
        tracing::info!(%request_id, "echo backend abort");
    }
}

/// Reports the image size instead of running a real model.
struct SizeModel;

impl VisionModel for SizeModel {
    fn generate(
        &self,
        request: &GenerationRequest,
        on_text: &mut dyn FnMut(&str),
    ) -> lmgate_infer::Result<String> {
        let image = request
            .image
            .as_ref()
            .ok_or_else(|| lmgate_infer::Error::engine("no image attached"))?;
        let mut text = String::new();
        for part in [
            "An image".to_string(),
            format!(" of {}x{} pixels", image.width(), image.height()),
            format!(" ({})", request.prompt),
        ] {
            text.push_str(&part);
            on_text(&text);
        }
        Ok(text)
    }
}

struct SizeLoader;

impl VisionLoader for SizeLoader {
    fn accelerator_available(&self) -> bool {
        false
    }

    fn load(&self, _model_path: &str, _device: Device) -> lmgate_infer::Result<Box<dyn VisionModel>> {
        Ok(Box::new(SizeModel))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = init_log(&log_level());
    let gateway_cfg = init_cfg()?;
    let (backend_cfg, engine_args) = backend_parts(&gateway_cfg);

    let engine = EngineRuntime::spawn(
        EngineRuntimeConfig::default(),
        Arc::new(EchoBackend { args: engine_args }),
    );
    let vision = Arc::new(VisionCell::new(
        Arc::new(SizeLoader),
        backend_cfg.vision_model_path.clone(),
    ));

    let bind_addr = backend_cfg.http_bind_addr;
    let allowed_origins = backend_cfg.allowed_origins.clone();
    let state = AppState {
        cfg: Arc::new(backend_cfg),
        engine,
        vision,
    };

    let mut builder = RouterBuilder::new().with_state(state);
    if let Some(origins) = allowed_origins {
        builder = builder.with_allowed_origins(origins);
    }
    let app = builder.build()?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "lmgate listening");
    axum::serve(listener, app).await?;
    Ok(())
}
