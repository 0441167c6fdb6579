//! Project list and project admin commands.

use anyhow::{Context, Result};
use console::style;
use uuid::Uuid;

use spaces::projects::{self, ProjectDraft};
use spaces::ui::icons::CHECK;
use spaces::ui::{render, with_spinner};

use super::{LoadedConfig, invalid, signed_in};
use crate::{ProjectArgs, ProjectsCommands};

fn draft_from(args: ProjectArgs) -> ProjectDraft {
    ProjectDraft {
        name: args.name,
        description: args.description,
        client_name: args.client,
        client_email: args.client_email,
        color: args.color,
    }
}

pub async fn cmd_projects(config: LoadedConfig, command: Option<ProjectsCommands>) -> Result<()> {
    match command.unwrap_or(ProjectsCommands::List { archived: false }) {
        ProjectsCommands::List { archived } => {
            let (ctx, _) = signed_in(config).await?;
            let data = ctx.data();
            let list = with_spinner(
                "Loading projects",
                projects::list_projects(data.as_ref(), archived),
            )
            .await
            .context("Failed to load projects")?;
            if list.is_empty() {
                println!("No projects yet. Create one with `spaces projects create <name>`.");
            } else {
                print!("{}", render::render_projects(&list));
            }
        }
        ProjectsCommands::Create(args) => {
            let draft = draft_from(args);
            // Check the form before touching the network.
            draft.validate(Uuid::nil()).map_err(|e| invalid(&e))?;
            let (ctx, profile) = signed_in(config).await?;
            let data = ctx.data();
            let project = with_spinner(
                "Creating project",
                projects::create_project(data.as_ref(), profile.organization_id, &draft),
            )
            .await?;
            println!(
                "{}Created {} {}",
                CHECK,
                style(&project.name).bold(),
                style(project.id).dim()
            );
        }
        ProjectsCommands::Archive { id } => {
            let (ctx, _) = signed_in(config).await?;
            let project = projects::archive(ctx.data().as_ref(), id)
                .await
                .context("Failed to archive project")?;
            println!("{}Archived {}", CHECK, style(&project.name).bold());
        }
        ProjectsCommands::Unarchive { id } => {
            let (ctx, _) = signed_in(config).await?;
            let project = projects::unarchive(ctx.data().as_ref(), id)
                .await
                .context("Failed to restore project")?;
            println!("{}Restored {}", CHECK, style(&project.name).bold());
        }
    }
    Ok(())
}
