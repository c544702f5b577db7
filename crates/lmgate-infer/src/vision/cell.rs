use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::vision::{Device, VisionHandle, VisionLoader};

/// Lazily loads the vision model on first use and shares it afterwards.
///
/// Readers take the lock-free fast path once the handle exists. Concurrent
/// first callers serialize on `init_lock`, and only the first of them loads;
/// the rest find the handle set when they get the lock. The load runs in its
/// own task that owns the lock guard and stores the result itself, so a caller
/// dropped mid-load neither releases the lock early nor loses the model. A
/// failed load stores nothing, so the next caller retries.
pub struct VisionCell {
    loader: Arc<dyn VisionLoader>,
    model_path: String,
    handle: Arc<OnceCell<Arc<VisionHandle>>>,
    init_lock: Arc<Mutex<()>>,
}

impl VisionCell {
    pub fn new(loader: Arc<dyn VisionLoader>, model_path: impl Into<String>) -> Self {
        Self {
            loader,
            model_path: model_path.into(),
            handle: Arc::new(OnceCell::new()),
            init_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    pub async fn acquire(&self) -> crate::Result<Arc<VisionHandle>> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let guard = self.init_lock.clone().lock_owned().await;
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let loader = self.loader.clone();
        let model_path = self.model_path.clone();
        let cell = self.handle.clone();
        let load = tokio::spawn(async move {
            let _guard = guard;
            let handle = match load_handle(loader, model_path.clone()).await {
                Ok(handle) => Arc::new(handle),
                Err(e) => {
                    error!(model_path = %model_path, error = %e.format_chain(), "failed to load vision model");
                    return Err(crate::Error::engine(format!(
                        "Failed to load vision model from {model_path}: {}",
                        e.detail()
                    )));
                }
            };

            // Cannot already be set: every writer holds `init_lock`.
            let _ = cell.set(handle.clone());
            info!(device = %handle.device, model_path = %handle.model_path, "vision model ready");
            Ok(handle)
        });

        load.await
            .map_err(|e| crate::Error::engine_with_source("vision model loader task failed", e))?
    }
}

async fn load_handle(
    loader: Arc<dyn VisionLoader>,
    model_path: String,
) -> crate::Result<VisionHandle> {
    tokio::task::spawn_blocking(move || {
        let device = if loader.accelerator_available() {
            Device::Cuda
        } else {
            Device::Cpu
        };
        info!(%device, model_path = %model_path, "loading vision model");
        let model = loader.load(&model_path, device)?;
        Ok::<_, crate::Error>(VisionHandle {
            model,
            device,
            model_path,
        })
    })
    .await
    .map_err(|e| crate::Error::engine_with_source("vision model loader task failed", e))?
}
