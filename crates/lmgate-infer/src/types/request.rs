use image::RgbImage;
use uuid::Uuid;

use crate::types::SamplingConfig;

pub type RequestId = Uuid;

/// One unit of generation work. Built once per inbound call and never mutated.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub request_id: RequestId,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub image: Option<RgbImage>,
    pub sampling: SamplingConfig,
}

impl GenerationRequest {
    pub fn text(request_id: RequestId, prompt: String, sampling: SamplingConfig) -> Self {
        Self {
            request_id,
            prompt,
            system_prompt: None,
            image: None,
            sampling,
        }
    }

    pub fn image(
        request_id: RequestId,
        system_prompt: String,
        prompt: String,
        image: RgbImage,
        max_new_tokens: usize,
    ) -> Self {
        Self {
            request_id,
            prompt,
            system_prompt: Some(system_prompt),
            image: Some(image),
            sampling: SamplingConfig::greedy(max_new_tokens),
        }
    }
}
