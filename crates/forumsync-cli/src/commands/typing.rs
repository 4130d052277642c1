//! Typing command handler

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;

use forumsync_core::{Config, LiveClient};

use super::SessionArgs;
use crate::output::Output;

/// Spacing between simulated keystrokes
const KEYSTROKE_INTERVAL: Duration = Duration::from_millis(250);

/// Type in a topic for a while, then wait for the idle stop to go out
pub async fn run(
    config: &Config,
    session: SessionArgs,
    topic: String,
    duration_secs: u64,
    output: &Output,
) -> Result<()> {
    let credentials = session.credentials()?;
    let sync_config = session.sync_config(config);
    let idle_timeout = sync_config.typing_timeout;
    let connect_timeout = sync_config.connect_timeout;
    let client = LiveClient::spawn(sync_config);

    let mut status = client.subscribe_status();
    client.connect(Some(credentials))?;

    tokio::time::timeout(connect_timeout, async {
        while !status.borrow_and_update().state.is_connected() {
            status.changed().await?;
        }
        anyhow::Ok(())
    })
    .await
    .context("Timed out waiting for the server")??;

    output.message(&format!("Typing in topic {} for {}s", topic, duration_secs));

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut keystrokes = tokio::time::interval(KEYSTROKE_INTERVAL);
    while Instant::now() < deadline {
        keystrokes.tick().await;
        client.emit_local_typing(topic.clone())?;
    }

    output.message(&format!(
        "Stopped typing; stop_typing goes out after {:?} idle",
        idle_timeout
    ));
    tokio::time::sleep(idle_timeout + KEYSTROKE_INTERVAL).await;

    client.shutdown().await?;
    output.success(&format!("Finished typing in topic {}", topic));
    Ok(())
}
