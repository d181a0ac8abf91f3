//! User-level configuration.
//!
//! Stored as JSON under the XDG config directory. A missing file is not
//! an error; a malformed file logs a warning and falls back to defaults.
//! Unknown keys are ignored so newer configs load on older builds. The
//! config directory is created mode 0700 and the file is written 0600.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Prometheus exporter settings (consumed by the external exporter).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub addr: String,
}

/// Alert delivery settings (consumed by the external dispatcher).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AlertsConfig {
    pub webhook: String,
    pub command: String,
    pub email: String,
    pub slack_webhook: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

/// Operator-declared server roles, used to contextualize findings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerIdentity {
    pub roles: Vec<String>,
}

/// The recognized configuration record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_layout: i64,
    pub interval_sec: u64,
    pub history_size: usize,
    pub default_section: String,
    pub prometheus: PrometheusConfig,
    pub alerts: AlertsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_identity: Option<ServerIdentity>,
    /// "" | "beginner" | "advanced"
    pub experience_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_layout: 0,
            interval_sec: 1,
            history_size: 300,
            default_section: String::new(),
            prometheus: PrometheusConfig::default(),
            alerts: AlertsConfig::default(),
            server_identity: None,
            experience_level: String::new(),
        }
    }
}

/// Configuration I/O failure. Only `save` surfaces errors; `load` always
/// degrades to defaults.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Encode(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Encode(e) => write!(f, "config encode error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// `$XDG_CONFIG_HOME/xtop/config.json`, falling back to
    /// `~/.config/xtop/config.json`.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| {
                let home = std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                home.join(".config")
            });
        base.join("xtop").join("config.json")
    }

    /// Load from `path`. Absent file → defaults; malformed file → warn
    /// and defaults.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed config, using defaults");
                Self::default()
            }
        }
    }

    /// Write to `path` with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o700)
                    .create(dir)
                    .map_err(ConfigError::Io)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Encode)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(ConfigError::Io)?;
        file.write_all(json.as_bytes()).map_err(ConfigError::Io)?;
        file.write_all(b"\n").map_err(ConfigError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.interval_sec, 1);
        assert_eq!(config.history_size, 300);
        assert!(!config.prometheus.enabled);
        assert!(config.server_identity.is_none());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let config = Config {
            interval_sec: 5,
            history_size: 600,
            default_section: "io".into(),
            prometheus: PrometheusConfig {
                enabled: true,
                addr: "127.0.0.1:9111".into(),
            },
            alerts: AlertsConfig {
                webhook: "https://example.invalid/hook".into(),
                ..Default::default()
            },
            server_identity: Some(ServerIdentity {
                roles: vec!["db".into(), "cache".into()],
            }),
            experience_level: "advanced".into(),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path), config);

        // Saving the loaded value reproduces the same bytes.
        let first = std::fs::read_to_string(&path).unwrap();
        Config::load(&path).save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn file_permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");
        Config::default().save(&path).unwrap();
        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn absent_and_malformed_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::load(&dir.path().join("absent.json")),
            Config::default()
        );

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert_eq!(Config::load(&bad), Config::default());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"interval_sec": 3, "future_option": {"nested": true}}"#,
        )
        .unwrap();
        let config = Config::load(&path);
        assert_eq!(config.interval_sec, 3);
        assert_eq!(config.history_size, 300);
    }
}
