use anyhow::{Context, Result};
use console::style;

use spaces::inbox::Inbox;
use spaces::ui::icons::{BELL, CHECK};
use spaces::ui::{render, with_spinner};

use super::{LoadedConfig, signed_in};
use crate::InboxCommands;

pub async fn cmd_inbox(config: LoadedConfig, command: Option<InboxCommands>) -> Result<()> {
    let command = command.unwrap_or(InboxCommands::List { unread: false });
    let unread_only = matches!(command, InboxCommands::List { unread: true });

    let (ctx, profile) = signed_in(config).await?;
    let mut inbox = with_spinner(
        "Loading inbox",
        Inbox::load(ctx.data(), profile.id, unread_only),
    )
    .await
    .context("Failed to load notifications")?;

    match command {
        InboxCommands::List { .. } => {
            print!("{}", render::render_inbox(inbox.items()));
            let unread = inbox.unread_count();
            if unread > 0 {
                println!("{}{}", BELL, style(format!("{} unread", unread)).bold());
            }
        }
        InboxCommands::Read { id } => {
            inbox
                .mark_read(id)
                .await
                .context("Failed to mark notification read")?;
            println!("{}Marked read", CHECK);
        }
        InboxCommands::ReadAll => {
            let changed = inbox
                .mark_all_read()
                .await
                .context("Failed to mark notifications read")?;
            println!("{}Marked {} notifications read", CHECK, changed);
        }
    }
    Ok(())
}
