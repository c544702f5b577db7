use std::net::{Ipv4Addr, SocketAddr};

use lmgate_config::{FinalEngineConfig, FinalGatewayConfig};
use serde::Serialize;
use tracing::info;

use crate::types::SamplingConfig;

/// Runtime settings shared by the router, the handlers and the stream tasks.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub http_bind_addr: SocketAddr,
    pub request_body_limit_bytes: usize,
    pub allowed_origins: Option<Vec<String>>,
    pub instance_id: Option<String>,

    pub stream_buffer: usize,
    pub stream_done_marker: bool,

    pub text_sampling: SamplingConfig,

    pub vision_model_path: String,
    pub model_name: String,
    pub vision_system_prompt: String,
    pub default_max_new_tokens: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            http_bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
            request_body_limit_bytes: 50 * 1024 * 1024,
            allowed_origins: None,
            instance_id: None,
            stream_buffer: 64,
            stream_done_marker: false,
            text_sampling: SamplingConfig::default(),
            vision_model_path: "/app/models/gemma-3-4b-it".to_string(),
            model_name: "google/gemma-3-4b-it".to_string(),
            vision_system_prompt: "You are a helpful assistant.".to_string(),
            default_max_new_tokens: 512,
        }
    }
}

impl From<&FinalGatewayConfig> for BackendConfig {
    fn from(cfg: &FinalGatewayConfig) -> Self {
        Self {
            http_bind_addr: cfg.http_bind_addr,
            request_body_limit_bytes: cfg.request_body_limit_bytes,
            allowed_origins: cfg.allowed_origins.clone(),
            instance_id: cfg.instance_id.clone(),
            stream_buffer: cfg.stream_buffer,
            stream_done_marker: cfg.stream_done_marker,
            text_sampling: SamplingConfig::from(&cfg.engine),
            vision_model_path: cfg.vision.model_path.clone(),
            model_name: cfg.vision.model_name.clone(),
            vision_system_prompt: cfg.vision.system_prompt.clone(),
            default_max_new_tokens: cfg.vision.default_max_new_tokens,
        }
    }
}

/// What a text backend is constructed with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineArgs {
    pub model: String,
    pub gpu_memory_utilization: f32,
    pub max_model_len: usize,
    pub enforce_eager: bool,
}

impl From<&FinalEngineConfig> for EngineArgs {
    fn from(cfg: &FinalEngineConfig) -> Self {
        Self {
            model: cfg.model_path.clone(),
            gpu_memory_utilization: cfg.gpu_memory_utilization,
            max_model_len: cfg.max_model_len,
            enforce_eager: cfg.enforce_eager,
        }
    }
}

impl EngineArgs {
    pub fn log(&self) {
        info!(
            model = %self.model,
            gpu_memory_utilization = self.gpu_memory_utilization,
            max_model_len = self.max_model_len,
            enforce_eager = self.enforce_eager,
            "engine args"
        );
    }
}
