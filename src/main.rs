use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use spaces::config::{ConfigOverrides, SpacesConfig};
use spaces_common::{Decision, Priority, TaskStatus};

mod cmd;

#[derive(Parser)]
#[command(name = "spaces")]
#[command(version, about = "Projects, kanban boards, inbox and client approvals from the terminal")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to spaces.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend URL. Overrides SPACES_SUPABASE_URL
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Public API key. Overrides SPACES_SUPABASE_ANON_KEY
    #[arg(long, global = true)]
    pub anon_key: Option<String>,

    /// Where the signed-in session is kept
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            url: self.url.clone(),
            anon_key: self.anon_key.clone(),
            session_file: self.session_file.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with e-mail and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
        #[arg(long, env = "SPACES_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(short, long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, env = "SPACES_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List and manage projects
    Projects {
        #[command(subcommand)]
        command: Option<ProjectsCommands>,
    },
    /// Show, rearrange or follow a project's board
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Create or edit tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Notifications
    Inbox {
        #[command(subcommand)]
        command: Option<InboxCommands>,
    },
    /// Tasks assigned to you, grouped by due date
    MyTasks,
    /// Workspace summary
    Dashboard {
        /// Limit the summary to one project
        #[arg(short, long)]
        project: Option<Uuid>,
    },
    /// Review a client approval request (no sign-in needed)
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
    /// Open a client path such as /app/inbox or /approval/<token>
    Open {
        path: String,
        /// Print the resolved route without running it
        #[arg(long)]
        resolve_only: bool,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Subcommand, Clone)]
pub enum ProjectsCommands {
    /// List projects
    List {
        /// Include archived projects
        #[arg(long)]
        archived: bool,
    },
    /// Create a project
    Create(ProjectArgs),
    Archive { id: Uuid },
    Unarchive { id: Uuid },
}

#[derive(Args, Clone)]
pub struct ProjectArgs {
    pub name: String,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long)]
    pub client_email: Option<String>,
    /// Accent color as #rrggbb
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Args, Clone, Default)]
pub struct FilterArgs {
    /// Match title or description
    #[arg(short, long)]
    pub search: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub assignee: Option<Uuid>,
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Print the board
    Show {
        project: Uuid,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Move a task to a column and slot
    Move {
        project: Uuid,
        /// Task id or its first characters
        task: String,
        status: TaskStatus,
        /// Slot in the column, 0 is the top (defaults to the bottom)
        #[arg(short, long)]
        index: Option<usize>,
    },
    /// Print the board and follow live changes until interrupted
    Watch {
        project: Uuid,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// Add a task at the bottom of its column
    Create {
        project: Uuid,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long, default_value = "discovery")]
        status: TaskStatus,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        assignee: Option<Uuid>,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
    },
    /// Change fields of a task
    Update {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long)]
        assignee: Option<Uuid>,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        /// Remove the description
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        /// Unassign the task
        #[arg(long, conflicts_with = "assignee")]
        clear_assignee: bool,
        /// Remove the due date
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum InboxCommands {
    /// List notifications, newest first
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification read
    Read { id: Uuid },
    /// Mark every notification read
    ReadAll,
}

#[derive(Subcommand, Clone)]
pub enum ApprovalCommands {
    /// Show what is waiting for a decision
    Show { token: String },
    /// Approve or reject
    Decide {
        token: String,
        /// approve or reject
        decision: Decision,
        #[arg(short, long)]
        comment: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Install the subscriber. Logs go to stderr, plus a daily file when a log
/// directory is configured; the returned guard flushes that file on drop.
fn init_tracing(verbose: bool, config: Option<&SpacesConfig>) -> Option<WorkerGuard> {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match config.and_then(|c| c.log_dir.as_ref()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "spaces.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.is_some_and(|c| c.log_json) {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Loaded up front for the log settings; commands that need a backend
    // turn a failure into their error.
    let config = SpacesConfig::load(cli.config.as_deref(), &cli.overrides());
    let _guard = init_tracing(cli.verbose, config.as_ref().ok());

    match &cli.command {
        Commands::Login { email, password } => {
            cmd::cmd_login(config, email.clone(), password.clone()).await?
        }
        Commands::Signup {
            email,
            name,
            password,
        } => cmd::cmd_signup(config, email.clone(), name.clone(), password.clone()).await?,
        Commands::Logout => cmd::cmd_logout(config).await?,
        Commands::Whoami => cmd::cmd_whoami(config).await?,
        Commands::Projects { command } => cmd::cmd_projects(config, command.clone()).await?,
        Commands::Board { command } => cmd::cmd_board(config, command.clone()).await?,
        Commands::Task { command } => cmd::cmd_task(config, command.clone()).await?,
        Commands::Inbox { command } => cmd::cmd_inbox(config, command.clone()).await?,
        Commands::MyTasks => cmd::cmd_my_tasks(config).await?,
        Commands::Dashboard { project } => cmd::cmd_dashboard(config, *project).await?,
        Commands::Approval { command } => cmd::cmd_approval(config, command.clone()).await?,
        Commands::Open { path, resolve_only } => {
            cmd::cmd_open(config, &cli, path, *resolve_only).await?
        }
        Commands::Config => cmd::cmd_config(config, cli.config.as_deref())?,
    }

    Ok(())
}
