//! Sign-in state, session persistence and profile resolution.
//!
//! After sign-up the profile row is created server-side by a trigger that can
//! lag behind the auth response. [`resolve_profile`] waits for it with a
//! bounded fixed-delay retry; running out of attempts is a terminal
//! [`ProfileState::Unresolved`], never an endless poll.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use spaces_common::Profile;

use crate::errors::{AuthError, GatewayError};
use crate::gateway::{AuthApi, DataGateway, Session, SignUp};
use crate::validation::{FieldError, ValidationErrors};

const MIN_PASSWORD_LEN: usize = 6;

/// Fixed-delay retry bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    Resolved(Profile),
    /// Gave up waiting for the profile row.
    Unresolved { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn {
        session: Session,
        profile: ProfileState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(ProfileState),
    /// The account exists but must be confirmed by e-mail before sign-in.
    ConfirmEmail { email: String },
}

/// Poll `get_profile` until the row exists or the policy is exhausted.
///
/// Retryable gateway failures count as an attempt; any other failure ends the
/// wait with that error.
pub async fn resolve_profile(
    data: &dyn DataGateway,
    user_id: Uuid,
    policy: RetryPolicy,
) -> Result<ProfileState, GatewayError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match data.get_profile(user_id).await {
            Ok(Some(profile)) => {
                tracing::debug!(%user_id, attempt, "profile resolved");
                return Ok(ProfileState::Resolved(profile));
            }
            Ok(None) => tracing::debug!(%user_id, attempt, "profile not provisioned yet"),
            Err(e) if e.is_retryable() => {
                tracing::warn!(%user_id, attempt, error = %e, "profile lookup failed")
            }
            Err(e) => return Err(e),
        }
        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    tracing::warn!(%user_id, attempts, "profile still missing, giving up");
    Ok(ProfileState::Unresolved { attempts })
}

fn validate_credentials(email: &str, password: &str, signing_up: bool) -> Result<(), AuthError> {
    let mut errors = ValidationErrors::default();
    let email = email.trim();
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !email.contains('@') {
        errors.push(FieldError::new("email", "Enter a valid email address"));
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    } else if signing_up && password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    errors.into_result(()).map_err(AuthError::Validation)
}

/// The signed-in user, shared by every authenticated view.
pub struct AuthStore {
    api: Arc<dyn AuthApi>,
    data: Arc<dyn DataGateway>,
    retry: RetryPolicy,
    sessions: Option<SessionStore>,
    state: AuthState,
}

impl AuthStore {
    pub fn new(api: Arc<dyn AuthApi>, data: Arc<dyn DataGateway>, retry: RetryPolicy) -> Self {
        Self {
            api,
            data,
            retry,
            sessions: None,
            state: AuthState::SignedOut,
        }
    }

    /// Persist sessions to `store` on sign-in and clear it on sign-out.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self.state, AuthState::SignedIn { .. })
    }

    /// The session and resolved profile, or why there is none.
    pub fn require(&self) -> Result<(&Session, &Profile), AuthError> {
        match &self.state {
            AuthState::SignedOut => Err(AuthError::NotSignedIn),
            AuthState::SignedIn {
                profile: ProfileState::Unresolved { attempts },
                ..
            } => Err(AuthError::ProfileUnresolved {
                attempts: *attempts,
            }),
            AuthState::SignedIn {
                session,
                profile: ProfileState::Resolved(profile),
            } => Ok((session, profile)),
        }
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<ProfileState, AuthError> {
        validate_credentials(email, password, false)?;
        let session = self
            .api
            .sign_in_with_password(email.trim(), password)
            .await
            .map_err(|e| match e {
                GatewayError::Unauthorized | GatewayError::Rejected { status: 400, .. } => {
                    AuthError::InvalidCredentials
                }
                other => AuthError::Gateway(other),
            })?;
        tracing::info!(user_id = %session.user.id, "signed in");
        self.establish(session).await
    }

    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        validate_credentials(email, password, true)?;
        let full_name = full_name.map(str::trim).filter(|n| !n.is_empty());
        match self.api.sign_up(email.trim(), password, full_name).await? {
            SignUp::Session(session) => {
                tracing::info!(user_id = %session.user.id, "account created");
                let profile = self.establish(session).await?;
                Ok(SignUpOutcome::SignedIn(profile))
            }
            SignUp::ConfirmationRequired(user) => {
                tracing::info!(user_id = %user.id, "account created, confirmation pending");
                Ok(SignUpOutcome::ConfirmEmail {
                    email: user.email.unwrap_or_else(|| email.trim().to_string()),
                })
            }
        }
    }

    /// Resume a stored session, refreshing it first when it has expired.
    pub async fn restore(&mut self, session: Session) -> Result<ProfileState, AuthError> {
        let session = if session.is_expired(Utc::now()) {
            tracing::debug!(user_id = %session.user.id, "stored session expired, refreshing");
            self.api
                .refresh(&session.refresh_token)
                .await
                .map_err(|e| match e {
                    GatewayError::Unauthorized | GatewayError::Rejected { .. } => {
                        AuthError::SessionExpired
                    }
                    other => AuthError::Gateway(other),
                })?
        } else {
            session
        };
        self.establish(session).await
    }

    /// Leave the signed-in state. The remote sign-out is best effort; local
    /// state is always cleared.
    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        if let AuthState::SignedIn { session, .. } =
            std::mem::replace(&mut self.state, AuthState::SignedOut)
        {
            if let Err(e) = self.api.sign_out(&session.access_token).await {
                tracing::warn!(error = %e, "remote sign-out failed");
            }
        }
        self.api.set_access_token(None);
        if let Some(store) = &self.sessions {
            store.clear()?;
        }
        Ok(())
    }

    async fn establish(&mut self, session: Session) -> Result<ProfileState, AuthError> {
        self.api.set_access_token(Some(session.access_token.clone()));
        let profile = resolve_profile(self.data.as_ref(), session.user.id, self.retry).await?;
        if let Some(store) = &self.sessions {
            store.save(&session)?;
        }
        self.state = AuthState::SignedIn {
            session,
            profile: profile.clone(),
        };
        Ok(profile)
    }
}

/// JSON file holding the last session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored session, if any. An unreadable file is treated as absent.
    pub fn load(&self) -> Option<Session> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), AuthError> {
        let write_err = |source: std::io::Error| AuthError::SessionWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        std::fs::write(&self.path, json).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthError::SessionWrite {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
