//! Log setup
//!
//! Logging stays off unless FORUMSYNC_LOG is set to a level. Output goes to
//! the configured `log_file`, or stderr when none is set.

use std::fs::File;

use forumsync_core::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log level
const LOG_ENV: &str = "FORUMSYNC_LOG";

pub fn init(config: &Config) {
    let Ok(log_level) = std::env::var(LOG_ENV) else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "forumsync_core={},forumsync_cli={}",
        log_level, log_level
    ));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore error if already initialized
    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = builder.with_ansi(false).with_writer(log_file).try_init();
            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
