// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::errors::RelayError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// SQLite database path. Defaults to `~/.local/share/chatrelay/chatrelay.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8090,
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the remote agent runnable.
    pub url: String,
    /// Database name forwarded in turn metadata.
    pub db_name: String,
    /// Model used when the caller does not pick one.
    pub default_model: String,
    /// Hard wall-clock ceiling for one streaming turn.
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/assistant".into(),
            db_name: "SciSciNet_US_V4".into(),
            default_model: "claude-4.0".into(),
            timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Daily free-question limiting. When false, every claim is admitted
    /// and nothing is counted.
    pub enabled: bool,
    /// Required positive limit when `enabled`; refusing to guess a default
    /// here is deliberate, a missing value is a startup error.
    pub daily_limit: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_limit: None,
        }
    }
}

impl QuotaConfig {
    /// The limit to enforce, already validated. 0 when limiting is off.
    pub fn effective_limit(&self) -> u32 {
        if self.enabled {
            self.daily_limit.unwrap_or(0)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Prefix of tool-produced file paths on the agent host.
    pub local_prefix: String,
    /// Public base URL substituted for `local_prefix` in download links.
    pub public_base_url: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            local_prefix: "/data/artifacts/".into(),
            public_base_url: "https://storage.googleapis.com/chatrelay-fs/".into(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = default_config_path();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Startup validation. A quota section that enables limiting without a
    /// positive limit is a configuration error, never a silent default.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.quota.enabled {
            match self.quota.daily_limit {
                Some(n) if n > 0 => {}
                Some(_) => {
                    return Err(RelayError::Config(
                        "quota.daily_limit must be a positive integer".into(),
                    ))
                }
                None => {
                    return Err(RelayError::Config(
                        "quota.daily_limit is required when quota.enabled is true".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.server.db_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chatrelay")
                .join("chatrelay.db")
        })
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatrelay")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.server.port, 8090);
        assert_eq!(c.agent.timeout_seconds, 3600);
        assert!(c.quota.enabled);
        assert!(c.quota.daily_limit.is_none());
    }

    #[test]
    fn test_default_quota_fails_validation() {
        // enabled without a limit must not pass startup
        let c = Config::default();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_disabled_quota_validates() {
        let mut c = Config::default();
        c.quota.enabled = false;
        assert!(c.validate().is_ok());
        assert_eq!(c.quota.effective_limit(), 0);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut c = Config::default();
        c.quota.daily_limit = Some(0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[server]
bind = "0.0.0.0"
port = 9000

[agent]
url = "http://agent:8080/research"
db_name = "corpus_v2"
default_model = "claude-4.0"
timeout_seconds = 1800

[quota]
enabled = true
daily_limit = 5

[artifacts]
local_prefix = "/srv/files/"
public_base_url = "https://files.example.com/"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.agent.db_name, "corpus_v2");
        assert_eq!(config.quota.daily_limit, Some(5));
        assert_eq!(config.quota.effective_limit(), 5);
        assert!(config.validate().is_ok());
        assert_eq!(config.artifacts.local_prefix, "/srv/files/");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
