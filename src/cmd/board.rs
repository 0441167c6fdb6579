//! Board commands: show, move and watch.

use anyhow::{Context, Result, bail};
use console::style;
use uuid::Uuid;

use spaces::board::{BoardState, BoardUpdate, DropOutcome, ProjectBoard, ReconcileOutcome, TaskFilter};
use spaces::context::AppContext;
use spaces::errors::BoardError;
use spaces::ui::icons::{CHECK, LIVE, SYNC, WARN};
use spaces::ui::render::{self, short_id};
use spaces::ui::with_spinner;

use super::{LoadedConfig, signed_in};
use crate::{BoardCommands, FilterArgs};

impl From<FilterArgs> for TaskFilter {
    fn from(args: FilterArgs) -> Self {
        TaskFilter {
            text: args.search,
            priority: args.priority,
            assignee: args.assignee,
        }
    }
}

/// Find a task by full id or by a unique prefix of its id.
fn find_task(state: &BoardState, needle: &str) -> Result<Uuid> {
    if let Ok(id) = needle.parse::<Uuid>() {
        return Ok(id);
    }
    let needle = needle.trim().to_lowercase().replace('-', "");
    if needle.is_empty() {
        bail!("Task id is required");
    }
    let matches: Vec<Uuid> = state
        .columns()
        .chain(state.flagged())
        .flat_map(|(_, tasks)| tasks.iter())
        .map(|t| t.id)
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("No task on this board starts with '{}'", needle),
        _ => bail!(
            "'{}' matches {} tasks; use more characters",
            needle,
            matches.len()
        ),
    }
}

async fn print_header(ctx: &AppContext, project_id: Uuid) -> Result<()> {
    let project = ctx
        .data()
        .get_project(project_id)
        .await
        .context("Failed to load project")?;
    match project {
        Some(project) => println!("{}\n", style(&project.name).bold().underlined()),
        None => bail!("Project {} not found", project_id),
    }
    Ok(())
}

pub async fn cmd_board(config: LoadedConfig, command: BoardCommands) -> Result<()> {
    match command {
        BoardCommands::Show { project, filter } => {
            let (ctx, _) = signed_in(config).await?;
            print_header(&ctx, project).await?;
            let board = with_spinner("Loading board", ProjectBoard::open(ctx.data(), project)).await?;
            print!("{}", render::render_board(board.state(), &filter.into()));
        }
        BoardCommands::Move {
            project,
            task,
            status,
            index,
        } => {
            let (ctx, _) = signed_in(config).await?;
            let mut board =
                with_spinner("Loading board", ProjectBoard::open(ctx.data(), project)).await?;
            let task_id = find_task(board.state(), &task)?;
            let index = index.unwrap_or_else(|| board.state().column(status).len());
            let title = board
                .state()
                .task(task_id)
                .map(|t| t.title.clone())
                .unwrap_or_else(|| short_id(task_id));

            match with_spinner("Saving move", board.move_task(task_id, status, index)).await {
                Ok(DropOutcome::Move(planned)) => {
                    println!(
                        "{}Moved {} to {} (slot {})",
                        CHECK,
                        style(&title).bold(),
                        planned.to.status.label(),
                        planned.to.index
                    );
                }
                Ok(DropOutcome::NoOp) | Ok(DropOutcome::Cancelled) => {
                    println!("{} is already there", style(&title).bold());
                }
                Err(e @ BoardError::MoveRolledBack { .. }) => {
                    eprintln!("{}Board restored to its previous order", WARN);
                    return Err(e).context("Move was not saved");
                }
                Err(e) => return Err(e.into()),
            }
        }
        BoardCommands::Watch { project, filter } => {
            let (ctx, _) = signed_in(config).await?;
            let filter: TaskFilter = filter.into();
            print_header(&ctx, project).await?;
            let mut board = with_spinner(
                "Connecting",
                ProjectBoard::mount(ctx.data(), ctx.realtime(), project),
            )
            .await?;
            print!("{}", render::render_board(board.state(), &filter));
            eprintln!("{}", style("Watching for changes, Ctrl-C to stop").dim());
            watch(&mut board, &filter).await;
            board.unmount().await;
        }
    }
    Ok(())
}

async fn watch(board: &mut ProjectBoard, filter: &TaskFilter) {
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = board.next_update() => update,
        };
        match update {
            Ok(Some(BoardUpdate::Live)) => eprintln!("{}{}", LIVE, style("live").green()),
            Ok(Some(BoardUpdate::Reconciled {
                outcome: ReconcileOutcome::Applied,
                ..
            })) => {
                println!();
                print!("{}", render::render_board(board.state(), filter));
            }
            Ok(Some(BoardUpdate::Reconciled { .. })) => {}
            Ok(Some(BoardUpdate::Reloaded)) => {
                eprintln!("{}{}", SYNC, style("reconnected, board reloaded").dim());
                println!();
                print!("{}", render::render_board(board.state(), filter));
            }
            Ok(None) => {
                eprintln!("{}Live updates stopped", WARN);
                break;
            }
            Err(e) => eprintln!("{}{}", WARN, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spaces_common::{Priority, Task, TaskStatus};

    fn task(id: &str, project_id: Uuid) -> Task {
        Task {
            id: id.parse().unwrap(),
            project_id,
            organization_id: Uuid::nil(),
            title: "t".into(),
            description: None,
            status: TaskStatus::Build,
            priority: Priority::Medium,
            position: 0,
            assignee_id: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_find_task_by_prefix() {
        let project = Uuid::new_v4();
        let mut state = BoardState::new(project);
        state.replace_all(vec![
            task("aaaa1111-0000-0000-0000-000000000000", project),
            task("aaaa2222-0000-0000-0000-000000000000", project),
        ]);
        let found = find_task(&state, "AAAA1").unwrap();
        assert_eq!(found.to_string(), "aaaa1111-0000-0000-0000-000000000000");
        assert!(find_task(&state, "aaaa").is_err());
        assert!(find_task(&state, "ffff").is_err());
    }
}
