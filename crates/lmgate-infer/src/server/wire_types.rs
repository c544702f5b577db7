use serde::{Deserialize, Serialize};

use crate::batch::{BatchResult, ImageUpload};
use crate::types::GenerationResult;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    /// Accepted for compatibility; `/predict` always answers with one JSON body.
    #[serde(default)]
    pub stream: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub elapsed_seconds: f64,
    pub tokens_per_second: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub response: String,
    pub usage: Usage,
    pub performance: Performance,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<&GenerationResult> for PredictResponse {
    fn from(result: &GenerationResult) -> Self {
        Self {
            response: result.text.clone(),
            usage: Usage {
                prompt_tokens: result.prompt_tokens,
                completion_tokens: result.completion_tokens,
                total_tokens: result.total_tokens(),
            },
            performance: Performance {
                elapsed_seconds: round2(result.elapsed.as_secs_f64()),
                tokens_per_second: round2(result.tokens_per_second()),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DescribeImageResponse {
    pub response: String,
    pub model: String,
    pub filename: Option<String>,
    pub max_new_tokens: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchDescribeResponse {
    pub results: Vec<BatchResult>,
    pub model: String,
    pub max_new_tokens: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Fields of a single-image multipart form, not yet validated.
#[derive(Clone, Debug, Default)]
pub struct DescribeImageForm {
    pub file: Option<ImageUpload>,
    pub prompt: Option<String>,
    pub max_new_tokens: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DescribeImageBatchForm {
    pub files: Vec<ImageUpload>,
    pub prompt: Option<String>,
    pub max_new_tokens: Option<String>,
}
