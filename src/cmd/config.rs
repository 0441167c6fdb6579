//! Configuration view: `spaces config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use spaces::config::{ENV_CONFIG, default_config_path};

use super::LoadedConfig;

pub fn cmd_config(config: LoadedConfig, explicit: Option<&Path>) -> Result<()> {
    let config = config.context("Configuration is incomplete")?;

    println!();
    println!("Spaces Configuration");
    println!("====================");
    println!();

    let file = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from))
        .or_else(default_config_path);
    match file {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not found, using env)", path.display()),
        None => println!("Config file: none"),
    }
    println!();

    println!("[backend]");
    println!("  url = \"{}\"", config.backend_url);
    println!("  anon_key = \"{}\"", config.masked_key());
    println!(
        "  request_timeout_secs = {}",
        config.request_timeout.as_secs()
    );
    println!();
    println!("[auth]");
    println!(
        "  profile_retry_attempts = {}",
        config.profile_retry.max_attempts
    );
    println!(
        "  profile_retry_delay_ms = {}",
        config.profile_retry.delay.as_millis()
    );
    println!();
    println!("[session]");
    println!("  path = \"{}\"", config.session_path.display());
    println!();
    println!("[logging]");
    match &config.log_dir {
        Some(dir) => println!("  dir = \"{}\"", dir.display()),
        None => println!("  dir = (stderr only)"),
    }
    println!("  json = {}", config.log_json);
    println!();
    println!(
        "Realtime endpoint: {}",
        config
            .realtime_url()
            .replace(&config.anon_key, &config.masked_key())
    );

    Ok(())
}
