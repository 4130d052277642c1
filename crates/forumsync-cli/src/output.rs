//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag), one object per line
//! - Quiet mode for scripting (--quiet flag)

use std::collections::BTreeMap;

use forumsync_core::{ConnectionStatus, ContentUpdate, PresenceSet, TypingSnapshot};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a connection status change
    pub fn status(&self, status: &ConnectionStatus) {
        match self.format {
            OutputFormat::Human => {
                let mut line = format!("[{}] {}", timestamp(), status.state);
                if let Some(ref close) = status.last_close {
                    line.push_str(&format!(" (last close: {} {})", close.code, close.reason));
                }
                if let Some(ref error) = status.last_error {
                    line.push_str(&format!(" (last error: {})", error));
                }
                println!("{}", line);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"event": "status", "status": status})
                );
            }
            OutputFormat::Quiet => println!("{}", status.state),
        }
    }

    /// Print the set of online users
    pub fn presence(&self, presence: &PresenceSet) {
        match self.format {
            OutputFormat::Human => {
                let names: Vec<&str> = presence.iter().map(|u| u.display_name.as_str()).collect();
                println!(
                    "[{}] {} online: {}",
                    timestamp(),
                    presence.len(),
                    if names.is_empty() {
                        "(nobody)".to_string()
                    } else {
                        names.join(", ")
                    }
                );
            }
            OutputFormat::Json => {
                let users: Vec<_> = presence.iter().collect();
                println!(
                    "{}",
                    serde_json::json!({"event": "presence", "online": users})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print who is typing where
    pub fn typing(&self, typing: &TypingSnapshot) {
        match self.format {
            OutputFormat::Human => {
                if typing.is_empty() {
                    println!("[{}] nobody is typing", timestamp());
                    return;
                }
                for topic in typing.topics() {
                    println!(
                        "[{}] typing in {}: {}",
                        timestamp(),
                        topic,
                        typing.names_in(topic).join(", ")
                    );
                }
            }
            OutputFormat::Json => {
                let topics: BTreeMap<&str, Vec<&str>> = typing
                    .topics()
                    .map(|topic| (topic, typing.names_in(topic)))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({"event": "typing", "topics": topics})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a content notification
    pub fn update(&self, update: &ContentUpdate) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "[{}] {} on post {}: {}",
                    timestamp(),
                    update.kind,
                    update.post_id().as_deref().unwrap_or("?"),
                    update.data
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "event": update.kind.to_string(),
                        "post_id": update.post_id(),
                        "data": update.data,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", update.kind);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
