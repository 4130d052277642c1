//! Command handlers

pub mod config;
pub mod typing;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use forumsync_core::{Config, Credentials, SyncConfig};

/// Environment variable consulted when --token is not given
const TOKEN_ENV: &str = "FORUMSYNC_TOKEN";

/// Identity flags shared by commands that open a session
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Your user ID on the forum
    #[arg(long)]
    pub user_id: String,

    /// Display name sent along with typing events
    #[arg(long)]
    pub username: String,

    /// Auth token (defaults to FORUMSYNC_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Server WebSocket URL (overrides server_url from config)
    #[arg(long)]
    pub url: Option<String>,
}

impl SessionArgs {
    /// Session settings with the --url override applied
    pub fn sync_config(&self, config: &Config) -> SyncConfig {
        let mut sync = config.sync_config();
        if let Some(ref url) = self.url {
            sync.server_url = url.clone();
        }
        sync
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let token = match &self.token {
            Some(token) => token.clone(),
            None => std::env::var(TOKEN_ENV)
                .with_context(|| format!("No token given. Pass --token or set {}.", TOKEN_ENV))?,
        };
        Ok(Credentials::new(
            self.user_id.clone(),
            self.username.clone(),
            token,
        ))
    }
}

/// Load config from an explicit path or the default location
pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    config.context("Failed to load configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: Option<&str>) -> SessionArgs {
        SessionArgs {
            user_id: "42".to_string(),
            username: "ana".to_string(),
            token: Some("secret".to_string()),
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_url_flag_overrides_config() {
        let config = Config::default();
        assert_eq!(
            args(None).sync_config(&config).server_url,
            config.server_url
        );
        assert_eq!(
            args(Some("wss://forum.example/ws"))
                .sync_config(&config)
                .server_url,
            "wss://forum.example/ws"
        );
    }

    #[test]
    fn test_credentials_from_flag() {
        let credentials = args(None).credentials().unwrap();
        assert_eq!(credentials.user_id, "42");
        assert_eq!(credentials.fresh_token().as_deref(), Some("secret"));
    }
}
