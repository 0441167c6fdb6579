//! Typed error hierarchy for the Spaces client.
//!
//! - `GatewayError`: any failed request against the hosted backend
//! - `PartialWrite`: a batch of task writes that stopped partway
//! - `BoardError`: board loading, drag state and optimistic move failures
//! - `RealtimeError`: change-feed subscription failures
//! - `ApprovalError`: the public approval surface
//! - `AuthError`: sign-in, session and profile resolution failures
//! - `FormError`: create/update forms (validation or gateway)
//! - `ConfigError`: startup configuration problems

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use spaces_common::Task;

use crate::validation::ValidationErrors;

/// Errors from the remote data gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not signed in or session expired")]
    Unauthorized,

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Transport failures and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

/// A batch of task writes that failed partway. Rows in `stored` were
/// persisted before `source` stopped the batch.
#[derive(Debug, Error)]
#[error("{source} ({} earlier write(s) stored)", .stored.len())]
pub struct PartialWrite {
    pub stored: Vec<Task>,
    #[source]
    pub source: GatewayError,
}

/// Errors from the board view (state, drag controller, optimistic moves).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Failed to load board: {0}")]
    Load(#[source] GatewayError),

    #[error("Task {id} is not on this board")]
    TaskNotFound { id: Uuid },

    #[error("A drag is already in progress")]
    DragInProgress,

    #[error("No drag in progress")]
    NotDragging,

    #[error("Another move is still being saved")]
    MoveInFlight,

    #[error("Could not save the move of task {task_id}; the board was restored")]
    MoveRolledBack {
        task_id: Uuid,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

/// Errors from the realtime change feed.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Failed to connect to realtime endpoint: {0}")]
    Connect(String),

    #[error("Channel join rejected: {0}")]
    JoinRejected(String),

    #[error("Realtime channel closed")]
    Closed,
}

/// Errors shown on the public approval page.
///
/// The page is unauthenticated, so backend details never reach the message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("This approval link is invalid or has expired")]
    InvalidOrExpired,

    #[error("A decision has already been recorded for this request")]
    AlreadyDecided,

    #[error("Could not reach the server. Please try again")]
    Network,

    #[error("Something went wrong. Please try again later")]
    Unavailable,

    #[error("{0}")]
    Validation(ValidationErrors),
}

impl ApprovalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

/// Errors from authentication and session handling.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not signed in. Run `spaces login` first")]
    NotSignedIn,

    #[error("Session expired. Run `spaces login` again")]
    SessionExpired,

    #[error("Account profile is not available yet (gave up after {attempts} attempts)")]
    ProfileUnresolved { attempts: u32 },

    #[error("Failed to persist session at {path}: {source}")]
    SessionWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors from create/update forms.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors while assembling the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {key}: set {env} or add it to spaces.toml")]
    Missing { key: &'static str, env: &'static str },

    #[error("Invalid backend URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldError;

    #[test]
    fn gateway_error_retryable_classification() {
        assert!(GatewayError::Unavailable("503".into()).is_retryable());
        assert!(!GatewayError::Unauthorized.is_retryable());
        assert!(!GatewayError::Conflict("dup".into()).is_retryable());
        let rejected = GatewayError::Rejected {
            status: 400,
            message: "bad".into(),
        };
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn board_error_rollback_carries_source() {
        let id = Uuid::new_v4();
        let err = BoardError::MoveRolledBack {
            task_id: id,
            source: GatewayError::Unavailable("down".into()),
        };
        assert!(err.to_string().contains(&id.to_string()));
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("down"));
    }

    #[test]
    fn approval_messages_do_not_leak_backend_details() {
        for err in [
            ApprovalError::InvalidOrExpired,
            ApprovalError::AlreadyDecided,
            ApprovalError::Network,
            ApprovalError::Unavailable,
        ] {
            let msg = err.to_string();
            assert!(!msg.contains("SQL"));
            assert!(!msg.contains("status"));
        }
        assert!(ApprovalError::Network.is_retryable());
        assert!(!ApprovalError::AlreadyDecided.is_retryable());
    }

    #[test]
    fn config_missing_names_the_env_var() {
        let err = ConfigError::Missing {
            key: "backend.url",
            env: "SPACES_SUPABASE_URL",
        };
        assert!(err.to_string().contains("SPACES_SUPABASE_URL"));
    }

    #[test]
    fn form_error_validation_lists_fields() {
        let mut errors = ValidationErrors::default();
        errors.push(FieldError::new("title", "Title is required"));
        let err = FormError::Validation(errors);
        assert_eq!(err.to_string(), "title: Title is required");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GatewayError::Unauthorized);
        assert_std_error(&BoardError::NotDragging);
        assert_std_error(&RealtimeError::Closed);
        assert_std_error(&ApprovalError::Unavailable);
        assert_std_error(&AuthError::NotSignedIn);
        assert_std_error(&ConfigError::InvalidValue {
            key: "x",
            value: "y".into(),
        });
    }
}
