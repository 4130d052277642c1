//! Watch command handler

use anyhow::Result;
use tracing::info;

use forumsync_core::{Config, LiveClient, NotificationKind};

use super::SessionArgs;
use crate::output::Output;

/// Connect and print every change until Ctrl-C
pub async fn run(config: &Config, session: SessionArgs, output: &Output) -> Result<()> {
    let credentials = session.credentials()?;
    let client = LiveClient::spawn(session.sync_config(config));

    for kind in [
        NotificationKind::VoteChanged,
        NotificationKind::CommentAdded,
        NotificationKind::ReplyAdded,
    ] {
        let output = *output;
        client.subscribe(kind, move |update| {
            output.update(update);
            Ok(())
        });
    }

    let mut status = client.subscribe_status();
    let mut presence = client.subscribe_presence();
    let mut typing = client.subscribe_typing();

    client.connect(Some(credentials))?;
    output.message("Watching for live updates. Press Ctrl-C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                output.status(&current);
            }
            changed = presence.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = presence.borrow_and_update().clone();
                output.presence(&current);
            }
            changed = typing.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = typing.borrow_and_update().clone();
                output.typing(&current);
            }
        }
    }

    client.shutdown().await?;
    output.success("Disconnected");
    Ok(())
}
