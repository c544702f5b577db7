use std::net::SocketAddr;

use serde::Serialize;

use crate::raw::gateway::{RawEngineConfig, RawGatewayConfig, RawVisionConfig};
use crate::{ConfigError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct FinalGatewayConfig {
    // HTTP
    pub http_bind_addr: SocketAddr,
    pub request_body_limit_bytes: usize,
    pub allowed_origins: Option<Vec<String>>,
    pub instance_id: Option<String>,

    // Streaming
    pub stream_buffer: usize,
    pub stream_done_marker: bool,

    pub engine: FinalEngineConfig,
    pub vision: FinalVisionConfig,
}

/// Settings the text engine is constructed with, plus the fixed sampling
/// parameters applied to every text request.
#[derive(Clone, Debug, Serialize)]
pub struct FinalEngineConfig {
    pub model_path: String,
    pub gpu_memory_utilization: f32,
    pub max_model_len: usize,
    pub max_tokens: usize,
    pub enforce_eager: bool,

    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FinalVisionConfig {
    pub model_path: String,
    pub model_name: String,
    pub system_prompt: String,
    pub default_max_new_tokens: usize,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| ConfigError::invalid(format!("{name} is not set")))
}

impl FinalGatewayConfig {
    /// Checks a raw config that has already been through `fill_default`.
    pub fn from_raw(raw: RawGatewayConfig) -> Result<Self> {
        let bind = required(raw.http_bind_addr, "http_bind_addr")?;
        let http_bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(format!("http_bind_addr {bind:?}: {e}")))?;

        let request_body_limit_bytes =
            required(raw.request_body_limit_bytes, "request_body_limit_bytes")?;
        if request_body_limit_bytes == 0 {
            return Err(ConfigError::invalid("request_body_limit_bytes must be >= 1"));
        }

        let stream_buffer = required(raw.stream_buffer, "stream_buffer")?;
        if stream_buffer == 0 {
            return Err(ConfigError::invalid("stream_buffer must be >= 1"));
        }

        Ok(Self {
            http_bind_addr,
            request_body_limit_bytes,
            allowed_origins: raw.allowed_origins,
            instance_id: raw.instance_id,
            stream_buffer,
            stream_done_marker: required(raw.stream_done_marker, "stream_done_marker")?,
            engine: FinalEngineConfig::from_raw(raw.engine)?,
            vision: FinalVisionConfig::from_raw(raw.vision)?,
        })
    }
}

impl FinalEngineConfig {
    pub fn from_raw(raw: RawEngineConfig) -> Result<Self> {
        let gpu_memory_utilization =
            required(raw.gpu_memory_utilization, "engine.gpu_memory_utilization")?;
        if !(gpu_memory_utilization > 0.0 && gpu_memory_utilization <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "engine.gpu_memory_utilization must be in (0, 1], got {gpu_memory_utilization}"
            )));
        }

        let max_model_len = required(raw.max_model_len, "engine.max_model_len")?;
        let max_tokens = required(raw.max_tokens, "engine.max_tokens")?;
        if max_model_len == 0 || max_tokens == 0 {
            return Err(ConfigError::invalid(
                "engine.max_model_len and engine.max_tokens must be >= 1",
            ));
        }

        let temperature = required(raw.temperature, "engine.temperature")?;
        if temperature < 0.0 {
            return Err(ConfigError::invalid("engine.temperature must be >= 0"));
        }
        let top_p = required(raw.top_p, "engine.top_p")?;
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(ConfigError::invalid("engine.top_p must be in (0, 1]"));
        }

        Ok(Self {
            model_path: required(raw.model_path, "engine.model_path")?,
            gpu_memory_utilization,
            max_model_len,
            max_tokens,
            enforce_eager: required(raw.enforce_eager, "engine.enforce_eager")?,
            temperature,
            top_p,
            stop: required(raw.stop, "engine.stop")?,
        })
    }
}

impl FinalVisionConfig {
    pub fn from_raw(raw: RawVisionConfig) -> Result<Self> {
        let default_max_new_tokens =
            required(raw.default_max_new_tokens, "vision.default_max_new_tokens")?;
        if !(1..=2048).contains(&default_max_new_tokens) {
            return Err(ConfigError::invalid(format!(
                "vision.default_max_new_tokens must be in [1, 2048], got {default_max_new_tokens}"
            )));
        }

        Ok(Self {
            model_path: required(raw.model_path, "vision.model_path")?,
            model_name: required(raw.model_name, "vision.model_name")?,
            system_prompt: required(raw.system_prompt, "vision.system_prompt")?,
            default_max_new_tokens,
        })
    }
}
