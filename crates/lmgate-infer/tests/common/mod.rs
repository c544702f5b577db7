#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, Response};
use futures::stream::{self, BoxStream, StreamExt};
use image::{DynamicImage, ImageFormat, RgbImage};
use lmgate_infer::config::BackendConfig;
use lmgate_infer::engine::{EngineRuntime, EngineRuntimeConfig, TextBackend};
use lmgate_infer::types::{EngineOutput, GenerationRequest, RequestId, SamplingConfig};
use lmgate_infer::vision::{Device, VisionCell, VisionLoader, VisionModel};
use lmgate_infer::{AppState, RouterBuilder};
use serde_json::Value;

pub const BOUNDARY: &str = "lmgate-test-boundary";
pub const PROMPT_TOKENS: usize = 5;

/// Replays fixed cumulative snapshots per user prompt and records aborts.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, Vec<String>>,
    hang_after_script: bool,
    pub aborted: Mutex<Vec<RequestId>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn with_script(mut self, prompt: &str, snapshots: &[&str]) -> Self {
        self.scripts.insert(
            prompt.to_string(),
            snapshots.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Keeps the generation open after the last snapshot until aborted.
    pub fn hanging(mut self) -> Self {
        self.hang_after_script = true;
        self
    }

    pub fn aborted(&self) -> Vec<RequestId> {
        self.aborted.lock().unwrap().clone()
    }
}

fn user_text(prompt: &str) -> String {
    prompt
        .strip_prefix("<start_of_turn>user\n")
        .and_then(|rest| rest.split("<end_of_turn>").next())
        .unwrap_or(prompt)
        .to_string()
}

impl TextBackend for ScriptedBackend {
    fn generate(
        &self,
        prompt: String,
        _sampling: SamplingConfig,
        _request_id: RequestId,
    ) -> BoxStream<'static, lmgate_infer::Result<EngineOutput>> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let user = user_text(&prompt);
        let snapshots = self
            .scripts
            .get(&user)
            .cloned()
            .unwrap_or_else(|| vec![user.clone()]);
        let total = snapshots.len();

        let outputs = stream::iter(snapshots.into_iter().enumerate().map(move |(i, text)| {
            Ok(EngineOutput {
                text,
                prompt_tokens: PROMPT_TOKENS,
                completion_tokens: i + 1,
                finished: i + 1 == total,
            })
        }));
        if self.hang_after_script {
            outputs.chain(stream::pending()).boxed()
        } else {
            outputs.boxed()
        }
    }

    fn abort(&self, request_id: RequestId) {
        self.aborted.lock().unwrap().push(request_id);
    }
}

/// Describes the image size, publishing a snapshot per word. Images 13 pixels
/// wide are rejected.
pub struct SizeModel;

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
        if image.width() == 13 {
            return Err(lmgate_infer::Error::engine("model rejected image"));
        }
        on_text("A");
        on_text(&format!("A {}x{}", image.width(), image.height()));
        on_text(&format!("A {}x{} image", image.width(), image.height()));
        Ok(format!("A {}x{} image.", image.width(), image.height()))
    }
}

pub struct CountingLoader {
    pub loads: AtomicUsize,
    failures_left: AtomicUsize,
}

impl CountingLoader {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl VisionLoader for CountingLoader {
    fn accelerator_available(&self) -> bool {
        false
    }

    fn load(
        &self,
        _model_path: &str,
        _device: Device,
    ) -> lmgate_infer::Result<Box<dyn VisionModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(lmgate_infer::Error::engine("CUDA out of memory"));
        }
        Ok(Box::new(SizeModel))
    }
}

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<ScriptedBackend>,
    pub loader: Arc<CountingLoader>,
    pub vision: Arc<VisionCell>,
}

pub fn test_config() -> BackendConfig {
    BackendConfig {
        instance_id: Some("test-instance".to_string()),
        ..BackendConfig::default()
    }
}

pub fn app_with(cfg: BackendConfig, backend: ScriptedBackend, loader: Arc<CountingLoader>) -> TestApp {
    let backend = Arc::new(backend);
    let engine = EngineRuntime::spawn(EngineRuntimeConfig::default(), backend.clone());
    let vision = Arc::new(VisionCell::new(loader.clone(), cfg.vision_model_path.clone()));
    let state = AppState {
        cfg: Arc::new(cfg),
        engine,
        vision: vision.clone(),
    };
    let router = RouterBuilder::new()
        .with_state(state)
        .build()
        .expect("router");
    TestApp {
        router,
        backend,
        loader,
        vision,
    }
}

pub fn app(backend: ScriptedBackend) -> TestApp {
    app_with(test_config(), backend, CountingLoader::new(0))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Vec<u8>),
}

pub fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn multipart_request(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

pub async fn json_body(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn ndjson_lines(resp: Response<Body>) -> Vec<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    std::str::from_utf8(&bytes)
        .expect("utf8 body")
        .lines()
        .map(|line| serde_json::from_str(line).expect("ndjson line"))
        .collect()
}

/// Concatenates the `response` fields of a delta stream.
pub fn joined_deltas(lines: &[Value]) -> String {
    lines
        .iter()
        .filter_map(|line| line.get("response").and_then(Value::as_str))
        .collect()
}
