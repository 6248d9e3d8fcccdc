//! Runnerd configuration system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root configuration, loaded from `~/.runnerd/config.toml` by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerdConfig {
    /// Directory holding per-process state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding timing rules and job artifacts.
    #[serde(default = "default_schedule_dir")]
    pub schedule_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_data_dir() -> PathBuf {
    RunnerdConfig::home_dir().join("data")
}
fn default_schedule_dir() -> PathBuf {
    RunnerdConfig::home_dir().join("schedules")
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for RunnerdConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            schedule_dir: default_schedule_dir(),
            log_level: default_log_level(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl RunnerdConfig {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Default config path (`~/.runnerd/config.toml`).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The Runnerd home directory (`~/.runnerd`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".runnerd")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Accepted `X-API-Key` values. Empty means the gateway is open.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7070
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RunnerdConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.gateway.port, 7070);
        assert!(cfg.gateway.api_keys.is_empty());
        assert!(cfg.data_dir.ends_with("data"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("runnerd-test-config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/runnerd-data"
log_level = "debug"

[gateway]
port = 9090
api_keys = ["secret"]
"#,
        )
        .unwrap();

        let cfg = RunnerdConfig::load_from(&path).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/runnerd-data"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.gateway.port, 9090);
        assert_eq!(cfg.gateway.api_keys, vec!["secret".to_string()]);
        // Unset fields keep their defaults.
        assert!(cfg.schedule_dir.ends_with("schedules"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunnerdConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = std::env::temp_dir().join("runnerd-test-config-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "data_dir = [not toml").unwrap();
        let err = RunnerdConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
