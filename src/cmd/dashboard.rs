//! Dashboard and "my tasks" views. Both are computed from task rows on the
//! client.

use anyhow::{Context, Result};
use chrono::Local;
use futures::future::try_join_all;
use uuid::Uuid;

use spaces::dashboard::{group_my_tasks, summarize};
use spaces::projects;
use spaces::ui::{render, with_spinner};

use super::{LoadedConfig, signed_in};

pub async fn cmd_dashboard(config: LoadedConfig, project: Option<Uuid>) -> Result<()> {
    let (ctx, _) = signed_in(config).await?;
    let data = ctx.data();

    let project_ids = match project {
        Some(id) => vec![id],
        None => projects::list_projects(data.as_ref(), false)
            .await
            .context("Failed to load projects")?
            .into_iter()
            .map(|p| p.id)
            .collect(),
    };
    let per_project = with_spinner(
        "Loading tasks",
        try_join_all(project_ids.iter().map(|id| data.list_tasks(*id))),
    )
    .await
    .context("Failed to load tasks")?;
    let tasks: Vec<_> = per_project.into_iter().flatten().collect();

    let summary = summarize(&tasks, Local::now().date_naive());
    print!("{}", render::render_summary(&summary));
    Ok(())
}

pub async fn cmd_my_tasks(config: LoadedConfig) -> Result<()> {
    let (ctx, profile) = signed_in(config).await?;
    let tasks = with_spinner("Loading tasks", ctx.data().list_assigned_tasks(profile.id))
        .await
        .context("Failed to load your tasks")?;
    let groups = group_my_tasks(tasks, Local::now().date_naive());
    print!("{}", render::render_my_tasks(&groups));
    Ok(())
}
