use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::env::EnvSource;
use crate::fill_default;

pub const DEFAULT_MODEL_PATH: &str = "/app/models/gemma-3-4b-it";
pub const DEFAULT_MODEL_NAME: &str = "google/gemma-3-4b-it";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawGatewayConfig {
    // HTTP
    pub http_bind_addr: Option<String>,
    pub request_body_limit_bytes: Option<usize>,
    pub allowed_origins: Option<Vec<String>>,
    pub instance_id: Option<String>,

    // Streaming
    pub stream_buffer: Option<usize>,
    pub stream_done_marker: Option<bool>,

    #[serde(default)]
    pub engine: RawEngineConfig,
    #[serde(default)]
    pub vision: RawVisionConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawEngineConfig {
    pub model_path: Option<String>,
    pub gpu_memory_utilization: Option<f32>,
    pub max_model_len: Option<usize>,
    pub max_tokens: Option<usize>,
    pub enforce_eager: Option<bool>,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawVisionConfig {
    pub model_path: Option<String>,
    pub model_name: Option<String>,
    pub system_prompt: Option<String>,
    pub default_max_new_tokens: Option<usize>,
}

impl RawGatewayConfig {
    pub fn fill_default(&mut self) {
        fill_default!(
            self,
            http_bind_addr: "0.0.0.0:5000".to_string(),
            request_body_limit_bytes: 50 * 1024 * 1024,
            stream_buffer: 64usize,
            stream_done_marker: false,
        );

        self.engine.fill_default();
        self.vision.fill_default();
    }

    /// Overrides fields with any valid values found in `env`. Unparseable or
    /// out-of-range values are logged by [`EnvSource`] and leave the field
    /// untouched, so the file value or the default applies. Range checks here
    /// mirror the ones `FinalGatewayConfig::from_raw` applies to file values.
    pub fn apply_env<F>(&mut self, env: &EnvSource<F>)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = env.parsed::<SocketAddr>("LMGATE_BIND_ADDR") {
            self.http_bind_addr = Some(addr.to_string());
        }
        if let Some(marker) = env.bool("LMGATE_STREAM_DONE_MARKER") {
            self.stream_done_marker = Some(marker);
        }
        if let Some(instance) = env.first_string(&["HOSTNAME", "CONTAINER_APP_REVISION"]) {
            self.instance_id = Some(instance);
        }

        self.engine.apply_env(env);
        self.vision.apply_env(env);
    }
}

impl RawEngineConfig {
    pub fn fill_default(&mut self) {
        fill_default!(
            self,
            model_path: DEFAULT_MODEL_PATH.to_string(),
            gpu_memory_utilization: 0.6f32,
            max_model_len: 4096usize,
            max_tokens: 2048usize,
            enforce_eager: true,
            temperature: 0.7f32,
            top_p: 0.9f32,
            stop: vec!["<end_of_turn>".to_string()],
        );
    }

    pub fn apply_env<F>(&mut self, env: &EnvSource<F>)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = env.string("LMGATE_ENGINE_MODEL_PATH") {
            self.model_path = Some(path);
        }
        if let Some(fraction) =
            env.parsed_if("VLLM_GPU_MEMORY_UTILIZATION", "(0, 1]", |f: &f32| {
                *f > 0.0 && *f <= 1.0
            })
        {
            self.gpu_memory_utilization = Some(fraction);
        }
        if let Some(len) = env.parsed_if("VLLM_MAX_MODEL_LEN", ">= 1", |n: &usize| *n >= 1) {
            self.max_model_len = Some(len);
        }
        if let Some(tokens) = env.parsed_if("VLLM_MAX_TOKENS", ">= 1", |n: &usize| *n >= 1) {
            self.max_tokens = Some(tokens);
        }
        if let Some(eager) = env.bool("VLLM_ENFORCE_EAGER") {
            self.enforce_eager = Some(eager);
        }
    }
}

impl RawVisionConfig {
    pub fn fill_default(&mut self) {
        fill_default!(
            self,
            model_path: DEFAULT_MODEL_PATH.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            default_max_new_tokens: 512usize,
        );
    }

    pub fn apply_env<F>(&mut self, env: &EnvSource<F>)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = env.string("GEMMA_MODEL_PATH") {
            self.model_path = Some(path);
        }
    }
}
