//! `spaces open <path>`: run whatever the client shows at a path.

use anyhow::Result;

use spaces::auth::SessionStore;
use spaces::config::default_session_path;
use spaces::routes::Route;

use super::LoadedConfig;
use crate::{ApprovalCommands, BoardCommands, Cli, FilterArgs};

pub async fn cmd_open(config: LoadedConfig, cli: &Cli, path: &str, resolve_only: bool) -> Result<()> {
    let session_path = match &config {
        Ok(config) => config.session_path.clone(),
        Err(_) => cli
            .session_file
            .clone()
            .unwrap_or_else(default_session_path),
    };
    let signed_in = SessionStore::new(session_path).load().is_some();
    let route = Route::resolve(path, signed_in);
    if resolve_only {
        println!("{}", route);
        return Ok(());
    }

    tracing::info!(%route, "opening");
    match route {
        Route::Login => super::cmd_login(config, None, None).await,
        Route::Approval { token } => {
            super::cmd_approval(config, ApprovalCommands::Show { token }).await
        }
        Route::Dashboard => super::cmd_dashboard(config, None).await,
        Route::Inbox => super::cmd_inbox(config, None).await,
        Route::MyTasks => super::cmd_my_tasks(config).await,
        Route::Projects => super::cmd_projects(config, None).await,
        Route::Project { project_id } => {
            super::cmd_board(
                config,
                BoardCommands::Show {
                    project: project_id,
                    filter: FilterArgs::default(),
                },
            )
            .await
        }
    }
}
