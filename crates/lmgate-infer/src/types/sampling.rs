use lmgate_config::FinalEngineConfig;

/// Decoding parameters fixed for the lifetime of one generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
    pub stop: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
            stop: vec!["<end_of_turn>".to_string()],
        }
    }
}

impl SamplingConfig {
    /// Deterministic decoding capped at `max_tokens`, as used by the vision routes.
    pub fn greedy(max_tokens: usize) -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens,
            stop: Vec::new(),
        }
    }
}

impl From<&FinalEngineConfig> for SamplingConfig {
    fn from(cfg: &FinalEngineConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            stop: cfg.stop.clone(),
        }
    }
}
