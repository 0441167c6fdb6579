//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `auth`          | `Login`, `Signup`, `Logout`, `Whoami`              |
//! | `projects`      | `Projects`                                         |
//! | `board`         | `Board`                                            |
//! | `tasks`         | `Task`                                             |
//! | `inbox`         | `Inbox`                                            |
//! | `dashboard`     | `Dashboard`, `MyTasks`                             |
//! | `approval`      | `Approval`                                         |
//! | `open`          | `Open`                                             |
//! | `config`        | `Config`                                           |

pub mod approval;
pub mod auth;
pub mod board;
pub mod config;
pub mod dashboard;
pub mod inbox;
pub mod open;
pub mod projects;
pub mod tasks;

pub use approval::cmd_approval;
pub use auth::{cmd_login, cmd_logout, cmd_signup, cmd_whoami};
pub use board::cmd_board;
pub use config::cmd_config;
pub use dashboard::{cmd_dashboard, cmd_my_tasks};
pub use inbox::cmd_inbox;
pub use open::cmd_open;
pub use projects::cmd_projects;
pub use tasks::cmd_task;

use anyhow::{Context, Result, anyhow};
use spaces::config::SpacesConfig;
use spaces::context::AppContext;
use spaces::errors::ConfigError;
use spaces::validation::ValidationErrors;
use spaces_common::Profile;

/// Outcome of loading the configuration, handed to every command.
pub type LoadedConfig = std::result::Result<SpacesConfig, ConfigError>;

/// Build the backend clients. Fails when the configuration is incomplete.
pub fn connect(config: LoadedConfig) -> Result<AppContext> {
    let config = config.context("Configuration is incomplete")?;
    AppContext::connect(config).context("Failed to set up the backend client")
}

/// Connect and resume the stored session.
pub async fn signed_in(config: LoadedConfig) -> Result<(AppContext, Profile)> {
    let mut ctx = connect(config)?;
    let (_, profile) = ctx.require_session().await?;
    Ok((ctx, profile))
}

/// Field messages, one per line, as a command error.
pub fn invalid(errors: &ValidationErrors) -> anyhow::Error {
    let lines: Vec<String> = errors
        .iter()
        .map(|e| format!("  {}: {}", e.field, e.message))
        .collect();
    anyhow!("Invalid input:\n{}", lines.join("\n"))
}
