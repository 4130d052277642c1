//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/forumsync/config.toml)
//! 3. Environment variables (FORUMSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::live::SyncConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "FORUMSYNC";

/// Keys accepted by [`Config::set`]
pub const KEYS: &[&str] = &[
    "server_url",
    "reconnect_base_delay_ms",
    "reconnect_max_delay_ms",
    "reconnect_attempt_cap",
    "typing_timeout_ms",
    "typing_refresh_ms",
    "connect_timeout_ms",
    "log_file",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the forum server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    #[serde(default = "default_reconnect_attempt_cap")]
    pub reconnect_attempt_cap: u32,

    /// How long a typing indicator lives without a refresh
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,

    #[serde(default = "default_typing_refresh_ms")]
    pub typing_refresh_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Write logs here instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_attempt_cap: default_reconnect_attempt_cap(),
            typing_timeout_ms: default_typing_timeout_ms(),
            typing_refresh_ms: default_typing_refresh_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (FORUMSYNC_SERVER_URL, FORUMSYNC_TYPING_TIMEOUT_MS, ...)
    /// 2. Config file (~/.config/forumsync/config.toml or FORUMSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("SERVER_URL") {
            if !val.is_empty() {
                self.server_url = val;
            }
        }

        override_number("RECONNECT_BASE_DELAY_MS", &mut self.reconnect_base_delay_ms);
        override_number("RECONNECT_MAX_DELAY_MS", &mut self.reconnect_max_delay_ms);
        override_number("RECONNECT_ATTEMPT_CAP", &mut self.reconnect_attempt_cap);
        override_number("TYPING_TIMEOUT_MS", &mut self.typing_timeout_ms);
        override_number("TYPING_REFRESH_MS", &mut self.typing_refresh_ms);
        override_number("CONNECT_TIMEOUT_MS", &mut self.connect_timeout_ms);

        // Empty string clears it
        if let Some(val) = env_var("LOG_FILE") {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Set a single key from its string form
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server_url" => self.server_url = value.to_string(),
            "reconnect_base_delay_ms" => self.reconnect_base_delay_ms = parse_value(key, value)?,
            "reconnect_max_delay_ms" => self.reconnect_max_delay_ms = parse_value(key, value)?,
            "reconnect_attempt_cap" => self.reconnect_attempt_cap = parse_value(key, value)?,
            "typing_timeout_ms" => self.typing_timeout_ms = parse_value(key, value)?,
            "typing_refresh_ms" => self.typing_refresh_ms = parse_value(key, value)?,
            "connect_timeout_ms" => self.connect_timeout_ms = parse_value(key, value)?,
            "log_file" => {
                self.log_file = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(value.into())
                };
            }
            _ => bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with FORUMSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forumsync")
            .join("config.toml")
    }

    /// Runtime settings for the live session
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_url: self.server_url.clone(),
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            reconnect_attempt_cap: self.reconnect_attempt_cap,
            typing_timeout: Duration::from_millis(self.typing_timeout_ms),
            typing_refresh: Duration::from_millis(self.typing_refresh_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

fn override_number<T: std::str::FromStr>(suffix: &str, target: &mut T) {
    let Some(val) = env_var(suffix) else {
        return;
    };
    match val.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring {}_{}={:?}: not a number", ENV_PREFIX, suffix, val),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number.", key))
}

fn default_server_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_reconnect_attempt_cap() -> u32 {
    10
}

fn default_typing_timeout_ms() -> u64 {
    3000
}

fn default_typing_refresh_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "FORUMSYNC_SERVER_URL",
        "FORUMSYNC_RECONNECT_BASE_DELAY_MS",
        "FORUMSYNC_RECONNECT_MAX_DELAY_MS",
        "FORUMSYNC_RECONNECT_ATTEMPT_CAP",
        "FORUMSYNC_TYPING_TIMEOUT_MS",
        "FORUMSYNC_TYPING_REFRESH_MS",
        "FORUMSYNC_CONNECT_TIMEOUT_MS",
        "FORUMSYNC_LOG_FILE",
        "FORUMSYNC_CONFIG",
    ];

    #[test]
    fn test_defaults_match_sync_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "ws://localhost:8080/ws");
        assert_eq!(config.sync_config(), SyncConfig::default());
    }

    #[test]
    fn test_env_override_server_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FORUMSYNC_SERVER_URL", "wss://forum.example/ws");
        config.apply_env_overrides();
        assert_eq!(config.server_url, "wss://forum.example/ws");

        // Empty keeps the previous value
        env::set_var("FORUMSYNC_SERVER_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.server_url, "wss://forum.example/ws");
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FORUMSYNC_TYPING_TIMEOUT_MS", "5000");
        env::set_var("FORUMSYNC_RECONNECT_ATTEMPT_CAP", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.typing_timeout_ms, 5000);
        assert_eq!(config.reconnect_attempt_cap, 10);
        assert_eq!(
            config.sync_config().typing_timeout,
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn test_env_override_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FORUMSYNC_LOG_FILE", "/tmp/forumsync.log");
        config.apply_env_overrides();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/forumsync.log")));

        env::set_var("FORUMSYNC_LOG_FILE", "");
        config.apply_env_overrides();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_load_from_str_partial() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "ws://example.com/ws"
            typing_refresh_ms = 1500
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, "ws://example.com/ws");
        assert_eq!(config.typing_refresh_ms, 1500);
        assert_eq!(config.reconnect_max_delay_ms, 30_000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("connect_timeout_ms", "2500").unwrap();
        config.set("log_file", "/var/log/forumsync.log").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.connect_timeout_ms, 2500);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = [").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_set_validates() {
        let mut config = Config::default();
        assert!(config.set("typing_timeout_ms", "soon").is_err());
        assert!(config.set("color", "blue").is_err());

        config.set("log_file", "none").unwrap();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_file_path_override() {
        let _guard = EnvGuard::new(ENV_VARS);

        assert!(Config::config_file_path().ends_with("forumsync/config.toml"));
        env::set_var("FORUMSYNC_CONFIG", "/etc/forumsync.toml");
        assert_eq!(
            Config::config_file_path(),
            PathBuf::from("/etc/forumsync.toml")
        );
    }
}
