//! Layered client configuration.
//!
//! Values are resolved in order: built-in defaults → `spaces.toml` →
//! environment (a `.env` file is loaded into the environment at startup) →
//! command-line flags. The backend URL and public API key have no default;
//! without them no session can exist, so startup aborts.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! url = "https://xyzcompany.supabase.co"
//! anon_key = "eyJhbGciOi..."
//! request_timeout_secs = 15
//!
//! [auth]
//! profile_retry_attempts = 5
//! profile_retry_delay_ms = 1000
//!
//! [session]
//! path = "/home/me/.config/spaces/session.json"
//!
//! [logging]
//! dir = "/home/me/.local/state/spaces/logs"
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::RetryPolicy;
use crate::errors::ConfigError;

pub const ENV_URL: &str = "SPACES_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SPACES_SUPABASE_ANON_KEY";
pub const ENV_CONFIG: &str = "SPACES_CONFIG";
pub const ENV_SESSION_FILE: &str = "SPACES_SESSION_FILE";
pub const ENV_LOG_DIR: &str = "SPACES_LOG_DIR";
pub const ENV_LOG_JSON: &str = "SPACES_LOG_JSON";
pub const ENV_TIMEOUT: &str = "SPACES_REQUEST_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// On-disk shape of `spaces.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSection {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    pub profile_retry_attempts: Option<u32>,
    pub profile_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub dir: Option<PathBuf>,
    pub json: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub session_file: Option<PathBuf>,
}

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    /// Backend base URL without a trailing slash.
    pub backend_url: String,
    pub anon_key: String,
    pub request_timeout: Duration,
    pub profile_retry: RetryPolicy,
    pub session_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl SpacesConfig {
    /// Load from the config file (explicit path, `SPACES_CONFIG`, or the
    /// default location) and the process environment.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let explicit = config_path
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from));
        let file = match explicit {
            Some(path) => FileConfig::read(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => FileConfig::read(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, env, overrides)
    }

    /// Merge a parsed file, an environment lookup and overrides.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let url = overrides
            .url
            .clone()
            .or_else(|| lookup(ENV_URL))
            .or(file.backend.url)
            .ok_or(ConfigError::Missing {
                key: "backend.url",
                env: ENV_URL,
            })?;
        let backend_url = normalize_url(&url)?;

        let anon_key = overrides
            .anon_key
            .clone()
            .or_else(|| lookup(ENV_ANON_KEY))
            .or(file.backend.anon_key)
            .ok_or(ConfigError::Missing {
                key: "backend.anon_key",
                env: ENV_ANON_KEY,
            })?;

        let timeout_secs = match lookup(ENV_TIMEOUT) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TIMEOUT,
                value: raw,
            })?,
            None => file
                .backend
                .request_timeout_secs
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let defaults = RetryPolicy::default();
        let profile_retry = RetryPolicy {
            max_attempts: file
                .auth
                .profile_retry_attempts
                .unwrap_or(defaults.max_attempts)
                .max(1),
            delay: file
                .auth
                .profile_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        };

        let session_path = overrides
            .session_file
            .clone()
            .or_else(|| lookup(ENV_SESSION_FILE).map(PathBuf::from))
            .or(file.session.path)
            .unwrap_or_else(default_session_path);

        let log_dir = lookup(ENV_LOG_DIR).map(PathBuf::from).or(file.logging.dir);
        let log_json = lookup(ENV_LOG_JSON)
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .or(file.logging.json)
            .unwrap_or(false);

        Ok(Self {
            backend_url,
            anon_key,
            request_timeout: Duration::from_secs(timeout_secs),
            profile_retry,
            session_path,
            log_dir,
            log_json,
        })
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.backend_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.backend_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.backend_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }

    /// The API key with all but the first and last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.anon_key.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl {
        value: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_string()),
        other => Err(ConfigError::InvalidUrl {
            value: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spaces").join("spaces.toml"))
}

pub fn default_session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spaces")
        .join("session.json")
}
