use std::time::Duration;

use serde::Serialize;

/// A snapshot of one generation. `text` is everything produced so far,
/// not the increment since the previous snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub finished: bool,
}

#[derive(Clone, Debug)]
pub enum EngineEvent {
    Output(EngineOutput),
    Done,
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub elapsed: Duration,
}

impl GenerationResult {
    pub fn new(output: EngineOutput, elapsed: Duration) -> Self {
        Self {
            text: output.text,
            prompt_tokens: output.prompt_tokens,
            completion_tokens: output.completion_tokens,
            elapsed,
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completion_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// One NDJSON line of a delta stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunk {
    Response(String),
    Error(String),
    Done(bool),
}
