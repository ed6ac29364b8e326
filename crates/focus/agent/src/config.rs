//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use focus_core::{ApplicationId, ConfigurationError, PolicyState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub intervention: InterventionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bundle id of the supervisor surface that shows the lock screen.
    #[serde(default = "default_self_id")]
    pub self_id: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,
    #[serde(default = "default_launchd_label")]
    pub launchd_label: String,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Where the keep-alive marker and status file live.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Policy in force at daemon start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub lock_mode: bool,
    #[serde(default)]
    pub blocked: Vec<String>, // Bundle IDs
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterventionConfig {
    #[serde(default)]
    pub dismiss: DismissBehavior,
}

/// How a blocked app is pushed out of the foreground.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DismissBehavior {
    #[default]
    Hide,
    Kill,
}

fn default_self_id() -> String {
    "dev.focus.launcher".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_liveness_interval_ms() -> u64 {
    1000
}

fn default_launchd_label() -> String {
    "dev.focus.agent".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/focus-agent.sock")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            self_id: default_self_id(),
            poll_interval_ms: default_poll_interval_ms(),
            liveness_interval_ms: default_liveness_interval_ms(),
            launchd_label: default_launchd_label(),
            socket_path: default_socket_path(),
            state_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("focus")
            .join("config.toml")
    }

    /// Policy described by the `[policy]` section.
    pub fn initial_policy(&self) -> Result<PolicyState, ConfigurationError> {
        PolicyState::from_raw(self.policy.lock_mode, self.policy.blocked.iter().cloned())
    }

    pub fn self_id(&self) -> Result<ApplicationId, ConfigurationError> {
        ApplicationId::parse(self.daemon.self_id.clone())
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(100))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("focus")
        })
    }

    /// Marker whose presence tells launchd to keep the agent alive.
    pub fn keepalive_path(&self) -> PathBuf {
        self.state_dir().join("keepalive")
    }

    /// Liveness status file refreshed while enforcement runs.
    pub fn status_path(&self) -> PathBuf {
        self.state_dir().join("status.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.self_id, "dev.focus.launcher");
        assert_eq!(config.daemon.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.intervention.dismiss, DismissBehavior::Hide);
        assert_eq!(config.initial_policy().unwrap(), PolicyState::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
[daemon]
self_id = "com.detox.launcher"
state_dir = "/var/run/focus"

[policy]
lock_mode = true
blocked = ["com.example.social", "com.example.games"]

[intervention]
dismiss = "kill"
"#,
        )
        .unwrap();

        assert_eq!(config.self_id().unwrap().as_str(), "com.detox.launcher");
        assert_eq!(config.daemon.liveness_interval_ms, 1000);
        assert_eq!(
            config.daemon.keepalive_path(),
            PathBuf::from("/var/run/focus/keepalive")
        );
        assert_eq!(config.intervention.dismiss, DismissBehavior::Kill);

        let policy = config.initial_policy().unwrap();
        assert!(policy.lock_mode_enabled);
        assert!(policy.is_listed("com.example.games"));
    }

    #[test]
    fn test_malformed_policy_is_configuration_error() {
        let config: Config = toml::from_str(
            r#"
[policy]
lock_mode = true
blocked = ["com.example.social", ""]
"#,
        )
        .unwrap();
        assert_eq!(
            config.initial_policy(),
            Err(ConfigurationError::EmptyApplicationId)
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::NotFound(_))
        ));

        std::fs::write(&path, "[policy]\nlock_mode = true\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert!(config.policy.lock_mode);

        std::fs::write(&path, "[policy\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
