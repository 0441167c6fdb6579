//! Application context: configuration, backends and the signed-in user.
//!
//! One `AppContext` is built per process and passed by reference to every
//! command; there are no globals.

use std::sync::Arc;

use spaces_common::Profile;

use crate::approval::ApprovalFlow;
use crate::auth::{AuthStore, ProfileState, SessionStore, SignUpOutcome};
use crate::config::SpacesConfig;
use crate::errors::{AuthError, GatewayError};
use crate::gateway::{ApprovalEndpoint, AuthApi, DataGateway, RestGateway, Session};
use crate::realtime::{PhoenixRealtime, RealtimeConnector};

/// Backend handles an [`AppContext`] is assembled from.
#[derive(Clone)]
pub struct Backends {
    pub auth: Arc<dyn AuthApi>,
    pub data: Arc<dyn DataGateway>,
    pub approvals: Arc<dyn ApprovalEndpoint>,
    pub realtime: Arc<dyn RealtimeConnector>,
}

impl Backends {
    /// Hosted backend over HTTPS and websockets.
    pub fn remote(config: &SpacesConfig) -> Result<Self, GatewayError> {
        let rest = Arc::new(RestGateway::from_config(config)?);
        Ok(Self {
            auth: rest.clone(),
            data: rest.clone(),
            approvals: rest,
            realtime: Arc::new(PhoenixRealtime::new(config.realtime_url())),
        })
    }

    /// Every surface served by one in-process backend.
    pub fn in_memory(gateway: Arc<crate::gateway::MemoryGateway>) -> Self {
        Self {
            auth: gateway.clone(),
            data: gateway.clone(),
            approvals: gateway.clone(),
            realtime: gateway,
        }
    }
}

pub struct AppContext {
    config: SpacesConfig,
    backends: Backends,
    auth: AuthStore,
    sessions: SessionStore,
}

impl AppContext {
    pub fn new(config: SpacesConfig, backends: Backends) -> Self {
        let sessions = SessionStore::new(config.session_path.clone());
        let auth = AuthStore::new(
            backends.auth.clone(),
            backends.data.clone(),
            config.profile_retry,
        )
        .with_session_store(sessions.clone());
        Self {
            config,
            backends,
            auth,
            sessions,
        }
    }

    pub fn connect(config: SpacesConfig) -> Result<Self, GatewayError> {
        let backends = Backends::remote(&config)?;
        Ok(Self::new(config, backends))
    }

    pub fn config(&self) -> &SpacesConfig {
        &self.config
    }

    pub fn data(&self) -> Arc<dyn DataGateway> {
        self.backends.data.clone()
    }

    pub fn realtime(&self) -> &dyn RealtimeConnector {
        self.backends.realtime.as_ref()
    }

    pub fn approvals(&self) -> ApprovalFlow {
        ApprovalFlow::new(self.backends.approvals.clone())
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    fn sync_realtime_token(&self) {
        let token = self
            .auth
            .require()
            .ok()
            .map(|(session, _)| session.access_token.clone());
        self.backends.realtime.set_access_token(token);
    }

    /// Resume the stored session, if there is one. `Ok(false)` when nobody
    /// is signed in on this machine.
    pub async fn restore_session(&mut self) -> Result<bool, AuthError> {
        if self.auth.is_signed_in() {
            return Ok(true);
        }
        let Some(session) = self.sessions.load() else {
            return Ok(false);
        };
        match self.auth.restore(session).await {
            Ok(_) => {
                self.sync_realtime_token();
                Ok(true)
            }
            Err(AuthError::SessionExpired) => {
                self.sessions.clear()?;
                Err(AuthError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Session and profile of the signed-in user, restoring the stored
    /// session first when needed.
    pub async fn require_session(&mut self) -> Result<(Session, Profile), AuthError> {
        if !self.restore_session().await? {
            return Err(AuthError::NotSignedIn);
        }
        let (session, profile) = self.auth.require()?;
        Ok((session.clone(), profile.clone()))
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<ProfileState, AuthError> {
        let profile = self.auth.sign_in(email, password).await?;
        self.sync_realtime_token();
        Ok(profile)
    }

    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let outcome = self.auth.sign_up(email, password, full_name).await?;
        self.sync_realtime_token();
        Ok(outcome)
    }

    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        // Resume first so the remote session is revoked too.
        if let Err(e) = self.restore_session().await {
            tracing::debug!(error = %e, "no session to revoke remotely");
        }
        self.auth.sign_out().await?;
        self.backends.realtime.set_access_token(None);
        Ok(())
    }
}
