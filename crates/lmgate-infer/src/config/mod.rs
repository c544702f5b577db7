mod backend_config;

pub use backend_config::{BackendConfig, EngineArgs};
