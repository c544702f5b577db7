mod cell;
mod decode;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use cell::VisionCell;
pub use decode::decode_image;

use crate::types::GenerationRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded image+text model. `generate` blocks the calling thread.
///
/// `on_text` receives the cumulative decoded text each time it grows; the
/// return value is the final text.
pub trait VisionModel: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
        on_text: &mut dyn FnMut(&str),
    ) -> crate::Result<String>;
}

/// Builds a [`VisionModel`]. Called at most once per successful load, on a
/// blocking thread.
pub trait VisionLoader: Send + Sync + 'static {
    fn accelerator_available(&self) -> bool;

    fn load(&self, model_path: &str, device: Device) -> crate::Result<Box<dyn VisionModel>>;
}

pub struct VisionHandle {
    pub model: Box<dyn VisionModel>,
    pub device: Device,
    pub model_path: String,
}

impl fmt::Debug for VisionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionHandle")
            .field("device", &self.device)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

/// Runs one non-streaming generation on the blocking pool.
pub async fn generate_blocking(
    handle: Arc<VisionHandle>,
    request: GenerationRequest,
) -> crate::Result<String> {
    tokio::task::spawn_blocking(move || handle.model.generate(&request, &mut |_: &str| {}))
        .await
        .map_err(|e| crate::Error::engine_with_source("vision generation task failed", e))?
}
