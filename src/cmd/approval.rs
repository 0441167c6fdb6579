//! Public approval page. Works without a session; the token in the link is
//! the only credential.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;

use spaces::ui::icons::{CHECK, WARN};
use spaces::ui::{render, with_spinner};
use spaces_common::{Decision, DecisionState};

use super::{LoadedConfig, connect};
use crate::ApprovalCommands;

pub async fn cmd_approval(config: LoadedConfig, command: ApprovalCommands) -> Result<()> {
    let ctx = connect(config)?;
    let flow = ctx.approvals();

    match command {
        ApprovalCommands::Show { token } => {
            let details = with_spinner("Loading request", flow.fetch_details(&token)).await?;
            print!("{}", render::render_approval(&details));
        }
        ApprovalCommands::Decide {
            token,
            decision,
            comment,
            yes,
        } => {
            let details = with_spinner("Loading request", flow.fetch_details(&token)).await?;
            print!("{}", render::render_approval(&details));
            if details.state.is_decided() {
                println!("{}This request was already decided.", WARN);
                return Ok(());
            }

            let verb = match decision {
                Decision::Approve => "Approve",
                Decision::Reject => "Reject",
            };
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("{} \"{}\"?", verb, details.task.title))
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
                if !confirmed {
                    println!("Nothing sent.");
                    return Ok(());
                }
            }

            let outcome = with_spinner(
                "Sending decision",
                flow.submit_decision(&token, decision, comment.as_deref()),
            )
            .await?;
            let label = match outcome.state {
                DecisionState::Approved => style("Approved").green(),
                DecisionState::Rejected => style("Rejected").red(),
                DecisionState::Pending => style("Pending").yellow(),
            };
            println!("{}{}. Thank you.", CHECK, label);
        }
    }
    Ok(())
}
