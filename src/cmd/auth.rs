//! Sign-in, sign-up and session commands.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password};

use spaces::auth::{ProfileState, SignUpOutcome};
use spaces::ui::icons::{CHECK, WARN};
use spaces::ui::with_spinner;

use super::{LoadedConfig, connect};

fn prompt_email(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read e-mail"),
    }
}

fn prompt_password(password: Option<String>, confirm: bool) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
    }
    prompt.interact().context("Failed to read password")
}

fn report_profile(profile: &ProfileState) {
    match profile {
        ProfileState::Resolved(profile) => {
            println!(
                "{}Signed in as {}",
                CHECK,
                style(profile.display_name()).bold()
            );
        }
        ProfileState::Unresolved { attempts } => {
            println!(
                "{}Signed in, but the account profile is not ready yet (checked {} times).",
                WARN, attempts
            );
            println!("   Run `spaces whoami` in a moment.");
        }
    }
}

pub async fn cmd_login(
    config: LoadedConfig,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut ctx = connect(config)?;
    let email = prompt_email(email)?;
    let password = prompt_password(password, false)?;
    let profile = with_spinner("Signing in", ctx.sign_in(&email, &password)).await?;
    report_profile(&profile);
    Ok(())
}

pub async fn cmd_signup(
    config: LoadedConfig,
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut ctx = connect(config)?;
    let email = prompt_email(email)?;
    let password = prompt_password(password, true)?;
    let outcome = with_spinner(
        "Creating account",
        ctx.sign_up(&email, &password, name.as_deref()),
    )
    .await?;
    match outcome {
        SignUpOutcome::SignedIn(profile) => report_profile(&profile),
        SignUpOutcome::ConfirmEmail { email } => {
            println!("{}Account created.", CHECK);
            println!(
                "   Confirm it from the message sent to {}, then run `spaces login`.",
                style(email).bold()
            );
        }
    }
    Ok(())
}

pub async fn cmd_logout(config: LoadedConfig) -> Result<()> {
    let mut ctx = connect(config)?;
    ctx.sign_out().await?;
    println!("{}Signed out", CHECK);
    Ok(())
}

pub async fn cmd_whoami(config: LoadedConfig) -> Result<()> {
    let mut ctx = connect(config)?;
    let (session, profile) = ctx.require_session().await?;
    println!("{}", style(profile.display_name()).bold());
    println!("  email         {}", profile.email);
    if let Some(role) = &profile.role {
        println!("  role          {}", role);
    }
    println!("  organization  {}", profile.organization_id);
    println!(
        "  session until {}",
        session.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}
