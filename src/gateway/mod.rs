//! Remote data gateway.
//!
//! ## Overview
//!
//! Every read and write against the hosted backend goes through one of three
//! traits. Implementations shape requests and map responses; they hold no
//! domain state.
//!
//! | Trait              | Surface                                          |
//! |--------------------|--------------------------------------------------|
//! | `DataGateway`      | `projects`, `tasks`, `notifications`, `profiles` |
//! | `AuthApi`          | password sign-in, sign-up, refresh, sign-out     |
//! | `ApprovalEndpoint` | public token-addressed approval functions        |
//!
//! | Implementation  | Use                                                  |
//! |-----------------|------------------------------------------------------|
//! | `RestGateway`   | the real backend over HTTPS (`reqwest`)              |
//! | `MemoryGateway` | in-process backend with a local change feed (tests)  |

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use spaces_common::{
    ApprovalDetails, Decision, DecisionOutcome, NewProject, NewTask, Notification,
    PositionUpdate, Profile, Project, ProjectPatch, Task, TaskPatch,
};

use crate::errors::{ApprovalError, GatewayError, PartialWrite};

pub use memory::MemoryGateway;
pub use rest::RestGateway;

#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>, GatewayError>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, GatewayError>;

    async fn create_project(&self, project: &NewProject) -> Result<Project, GatewayError>;

    async fn update_project(&self, id: Uuid, patch: &ProjectPatch)
    -> Result<Project, GatewayError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, GatewayError>;

    /// All tasks of a project, any order.
    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, GatewayError>;

    /// Tasks assigned to a user across projects.
    async fn list_assigned_tasks(&self, assignee_id: Uuid) -> Result<Vec<Task>, GatewayError>;

    async fn create_task(&self, task: &NewTask) -> Result<Task, GatewayError>;

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, GatewayError>;

    /// Persist the `(status, position)` writes of one board move, in order.
    /// Returns the stored rows. On failure the error carries the rows that
    /// were written before it.
    async fn update_positions(&self, updates: &[PositionUpdate]) -> Result<Vec<Task>, PartialWrite>;

    /// Newest first.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, GatewayError>;

    async fn mark_notification_read(
        &self,
        id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<Notification, GatewayError>;

    /// Returns the number of notifications changed.
    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<usize, GatewayError>;

    /// `Ok(None)` while the server-side profile row does not exist yet.
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, GatewayError>;
}

/// Authenticated user as returned by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a sign-up: a session, or a pending e-mail confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUp {
    Session(Session),
    ConfirmationRequired(AuthUser),
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, GatewayError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUp, GatewayError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError>;

    /// Token used as bearer for subsequent data requests.
    fn set_access_token(&self, token: Option<String>);
}

/// Public approval functions. Callers are unauthenticated; only the token
/// identifies the request.
#[async_trait]
pub trait ApprovalEndpoint: Send + Sync {
    async fn fetch_approval(&self, token: &str) -> Result<ApprovalDetails, ApprovalError>;

    async fn submit_approval(
        &self,
        token: &str,
        decision: Decision,
        comment: Option<&str>,
    ) -> Result<DecisionOutcome, ApprovalError>;
}
