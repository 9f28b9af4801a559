use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::config::schema::{EngineConfig, LogFormat, CONFIG_VERSION};
use crate::error::ConfigError;

pub const ENV_DATABASE_PATH: &str = "SNAPEX_DATABASE_PATH";
pub const ENV_OUTPUT_DIR: &str = "SNAPEX_OUTPUT_DIR";
pub const ENV_LOG_FORMAT: &str = "SNAPEX_LOG_FORMAT";
pub const ENV_BIND: &str = "SNAPEX_BIND";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let mut config: EngineConfig = serde_json::from_str(content)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn default_config() -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
    if let Some(path) = env_value(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(path) = env_value(ENV_OUTPUT_DIR) {
        config.output_directory = PathBuf::from(path);
    }
    if let Some(format) = env_value(ENV_LOG_FORMAT) {
        config.logging.format = LogFormat::parse(&format).ok_or_else(|| ConfigError::Validation {
            message: format!("{} must be 'text' or 'json', got '{}'", ENV_LOG_FORMAT, format),
        })?;
    }
    if let Some(bind) = env_value(ENV_BIND) {
        config.server.bind = bind;
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "database_path must not be empty".to_string(),
        });
    }
    if config.output_directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory must not be empty".to_string(),
        });
    }

    for (backup_id, directory) in &config.mounts.directories {
        if backup_id.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "mounts.directories contains an empty backup id".to_string(),
            });
        }
        if directory.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("mounts.directories.{} has an empty path", backup_id),
            });
        }
    }

    if config.pipeline.progress_flush_every == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.progress_flush_every must be at least 1".to_string(),
        });
    }

    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "logging.level must not be empty".to_string(),
        });
    }

    if config.server.bind.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::Validation {
            message: format!("server.bind is not a socket address: {}", config.server.bind),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [ENV_DATABASE_PATH, ENV_OUTPUT_DIR, ENV_LOG_FORMAT, ENV_BIND] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_load_full_config() {
        clear_env();
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/snapex/snapex.db",
            "output_directory": "/var/lib/snapex/output",
            "mounts": {
                "grace_period_secs": 10,
                "reconcile_interval_secs": 0,
                "directories": {"backup-1": "/mnt/backup-1"}
            },
            "pipeline": {"max_error_details": 20, "progress_flush_every": 5},
            "logging": {"level": "snapex=debug", "format": "json"},
            "server": {"bind": "0.0.0.0:9000"}
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/snapex/snapex.db"));
        assert_eq!(config.mounts.grace_period_secs, 10);
        assert_eq!(config.mounts.reconcile_interval_secs, 0);
        assert_eq!(
            config.mounts.directories["backup-1"],
            PathBuf::from("/mnt/backup-1")
        );
        assert_eq!(config.pipeline.progress_flush_every, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"output_directory": "/tmp/out"}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.output_directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.version, "1.0");
    }

    #[test]
    #[serial]
    fn test_missing_file() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    #[serial]
    fn test_invalid_json() {
        clear_env();
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    #[serial]
    fn test_rejects_unsupported_version() {
        clear_env();
        let err = load_config_from_str(r#"{"version": "2.0"}"#).unwrap_err();
        assert!(err.to_string().contains("Unsupported config version"));
    }

    #[test]
    #[serial]
    fn test_rejects_bad_values() {
        clear_env();
        for bad in [
            r#"{"server": {"bind": "localhost"}}"#,
            r#"{"pipeline": {"progress_flush_every": 0}}"#,
            r#"{"logging": {"level": " "}}"#,
            r#"{"mounts": {"directories": {"b1": ""}}}"#,
        ] {
            assert!(
                matches!(
                    load_config_from_str(bad),
                    Err(ConfigError::Validation { .. })
                ),
                "{}",
                bad
            );
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(ENV_DATABASE_PATH, "/env/snapex.db");
        std::env::set_var(ENV_OUTPUT_DIR, "/env/out");
        std::env::set_var(ENV_LOG_FORMAT, "json");
        std::env::set_var(ENV_BIND, "127.0.0.1:9999");

        let config = load_config_from_str(r#"{"output_directory": "/file/out"}"#).unwrap();
        clear_env();

        assert_eq!(config.database_path, PathBuf::from("/env/snapex.db"));
        assert_eq!(config.output_directory, PathBuf::from("/env/out"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.bind, "127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn test_env_log_format_must_be_known() {
        clear_env();
        std::env::set_var(ENV_LOG_FORMAT, "xml");
        let result = default_config();
        clear_env();
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    #[serial]
    fn test_default_config_without_env() {
        clear_env();
        let config = default_config().unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
