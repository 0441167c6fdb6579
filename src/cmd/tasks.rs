//! Task create and edit commands.

use anyhow::{Context, Result};
use console::style;

use spaces::board::ProjectBoard;
use spaces::tasks::{self, TaskDraft, TaskEdit};
use spaces::ui::icons::CHECK;
use spaces::ui::render::short_id;
use spaces::ui::with_spinner;

use super::{LoadedConfig, invalid, signed_in};
use crate::TaskCommands;

pub async fn cmd_task(config: LoadedConfig, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Create {
            project,
            title,
            description,
            status,
            priority,
            assignee,
            due,
        } => {
            let draft = TaskDraft {
                title,
                description,
                status,
                priority,
                assignee_id: assignee,
                due_date: due,
            };
            // An invalid draft never reaches the backend.
            draft.validate().map_err(|e| invalid(&e))?;

            let (ctx, profile) = signed_in(config).await?;
            let mut board =
                with_spinner("Loading board", ProjectBoard::open(ctx.data(), project)).await?;
            let task = with_spinner(
                "Creating task",
                board.create_task(profile.organization_id, &draft),
            )
            .await
            .context("Failed to create task")?;
            println!(
                "{}Created {} {} in {}",
                CHECK,
                style(short_id(task.id)).dim(),
                style(&task.title).bold(),
                task.status.label()
            );
        }
        TaskCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            assignee,
            due,
            clear_description,
            clear_assignee,
            clear_due,
        } => {
            let edit = TaskEdit {
                title,
                description: edit_or_clear(description, clear_description),
                status,
                priority,
                assignee_id: edit_or_clear(assignee, clear_assignee),
                due_date: edit_or_clear(due, clear_due),
            };
            edit.validate().map_err(|e| invalid(&e))?;

            let (ctx, _) = signed_in(config).await?;
            let data = ctx.data();
            let task = with_spinner("Saving task", tasks::update_task(data.as_ref(), id, &edit))
                .await
                .context("Failed to update task")?;
            println!("{}Updated {}", CHECK, style(&task.title).bold());
        }
    }
    Ok(())
}

/// `Some(None)` when the field's `--clear-*` flag was given.
fn edit_or_clear<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}
