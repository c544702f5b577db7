use clia_tracing_config::WorkerGuard;
use lmgate_config::{EnvSource, FinalGatewayConfig};
use tracing::info;

use crate::config::{BackendConfig, EngineArgs};

/// Level from `LMGATE_LOG_LEVEL`, read before the rest of the config so
/// that config warnings are already logged.
pub fn log_level() -> String {
    lmgate_config::log_level(&EnvSource::process())
}

pub fn init_log(level: &str) -> WorkerGuard {
    let guard = clia_tracing_config::build()
        .filter_level(level)
        .with_ansi(true)
        .to_stdout(true)
        .init();
    info!("log level: {}", level);
    guard
}

pub fn init_cfg() -> lmgate_config::Result<FinalGatewayConfig> {
    lmgate_config::load_gateway_config(&EnvSource::process())
}

/// Splits the validated config into what the router runs with and what the
/// text backend is built from, logging the engine arguments on the way.
pub fn backend_parts(cfg: &FinalGatewayConfig) -> (BackendConfig, EngineArgs) {
    let backend = BackendConfig::from(cfg);
    let args = EngineArgs::from(&cfg.engine);
    args.log();
    info!(
        bind = %backend.http_bind_addr,
        model = %backend.model_name,
        vision_model_path = %backend.vision_model_path,
        "gateway config loaded"
    );
    (backend, args)
}
