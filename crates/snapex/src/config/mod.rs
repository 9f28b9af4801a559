pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, default_config, load_config, load_config_from_str};
pub use schema::{
    EngineConfig, LogFormat, LoggingConfig, MountsConfig, PipelineConfig, ServerConfig,
};
