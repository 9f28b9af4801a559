use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{RunnerSettings, DEFAULT_MAX_ERROR_DETAILS, DEFAULT_PROGRESS_FLUSH_EVERY};

pub const CONFIG_VERSION: &str = "1.0";

/// Engine configuration. Every section is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default)]
    pub mounts: MountsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: default_database_path(),
            output_directory: default_output_directory(),
            mounts: MountsConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            output_directory: self.output_directory.clone(),
            max_error_details: self.pipeline.max_error_details,
            progress_flush_every: self.pipeline.progress_flush_every,
        }
    }
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn snapex_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".snapex"))
        .unwrap_or_else(|| std::env::temp_dir().join("snapex"))
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| snapex_home().join("data/snapex.db"))
}

fn default_output_directory() -> PathBuf {
    snapex_home().join("output")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountsConfig {
    /// How long a requested session may stay invisible upstream before it is
    /// marked stale.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// 0 disables periodic reconciliation; manual triggers still work.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Backup id to an already-mounted local directory.
    #[serde(default)]
    pub directories: BTreeMap<String, PathBuf>,
}

fn default_grace_period_secs() -> u64 {
    30
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

impl Default for MountsConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            directories: BTreeMap::new(),
        }
    }
}

impl MountsConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_error_details")]
    pub max_error_details: usize,
    #[serde(default = "default_progress_flush_every")]
    pub progress_flush_every: u64,
}

fn default_max_error_details() -> usize {
    DEFAULT_MAX_ERROR_DETAILS
}

fn default_progress_flush_every() -> u64 {
    DEFAULT_PROGRESS_FLUSH_EVERY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_error_details: default_max_error_details(),
            progress_flush_every: default_progress_flush_every(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
