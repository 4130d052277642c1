//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use forumsync_core::Config;

use super::load_config;
use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config = load_config(config_path)?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  server_url:              {}", config.server_url);
            println!("  reconnect_base_delay_ms: {}", config.reconnect_base_delay_ms);
            println!("  reconnect_max_delay_ms:  {}", config.reconnect_max_delay_ms);
            println!("  reconnect_attempt_cap:   {}", config.reconnect_attempt_cap);
            println!("  typing_timeout_ms:       {}", config.typing_timeout_ms);
            println!("  typing_refresh_ms:       {}", config.typing_refresh_ms);
            println!("  connect_timeout_ms:      {}", config.connect_timeout_ms);
            println!(
                "  log_file:                {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
