//! HTTPS gateway for the hosted backend.
//!
//! | Surface          | Path                                   |
//! |------------------|----------------------------------------|
//! | tables           | `/rest/v1/{table}` (PostgREST filters) |
//! | auth             | `/auth/v1/{token,signup,logout}`       |
//! | approval         | `/functions/v1/approval-{details,decision}` |

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use spaces_common::{
    ApprovalDetails, Decision, DecisionOutcome, NewProject, NewTask, Notification,
    PositionUpdate, Profile, Project, ProjectPatch, Task, TaskPatch,
};

use super::{ApprovalEndpoint, AuthApi, AuthUser, DataGateway, Session, SignUp};
use crate::config::SpacesConfig;
use crate::errors::{ApprovalError, GatewayError, PartialWrite};

/// Error body shapes of the backend's services, all optional.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.error_description.as_deref())
            .or(self.error.as_deref())
    }

    fn code(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| {
                Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

pub struct RestGateway {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

impl RestGateway {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spaces/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &SpacesConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.backend_url.clone(),
            config.anon_key.clone(),
            config.request_timeout,
        )
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        token.unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        let builder = self.request(method.clone(), &format!("/rest/v1/{}", table), &self.bearer());
        if method == Method::GET {
            builder
        } else {
            builder.header("Prefer", "return=representation")
        }
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>, GatewayError> {
        let response = check(builder.send().await?, what).await?;
        decode(response).await
    }

    /// Single-row write; an empty representation means the filter matched
    /// nothing.
    async fn one<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, GatewayError> {
        self.rows(builder, what)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound {
                what: what.to_string(),
            })
    }
}

async fn check(response: Response, what: &str) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body
        .text()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    tracing::debug!(status = status.as_u16(), %message, what, "backend rejected request");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::NOT_FOUND => GatewayError::NotFound {
            what: what.to_string(),
        },
        StatusCode::CONFLICT => GatewayError::Conflict(message),
        s if s.is_server_error() => GatewayError::Unavailable(message),
        s => GatewayError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl DataGateway for RestGateway {
    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>, GatewayError> {
        let mut query = vec![("select", "*".to_string()), ("order", "created_at.desc".into())];
        if !include_archived {
            query.push(("is_archived", eq(false)));
        }
        self.rows(self.table(Method::GET, "projects").query(&query), "Projects")
            .await
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, GatewayError> {
        let rows: Vec<Project> = self
            .rows(
                self.table(Method::GET, "projects")
                    .query(&[("id", eq(id)), ("select", "*".into())]),
                "Project",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, GatewayError> {
        self.one(self.table(Method::POST, "projects").json(project), "Project")
            .await
    }

    async fn update_project(
        &self,
        id: Uuid,
        patch: &ProjectPatch,
    ) -> Result<Project, GatewayError> {
        self.one(
            self.table(Method::PATCH, "projects")
                .query(&[("id", eq(id))])
                .json(patch),
            &format!("Project {}", id),
        )
        .await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, GatewayError> {
        let rows: Vec<Task> = self
            .rows(
                self.table(Method::GET, "tasks")
                    .query(&[("id", eq(id)), ("select", "*".into())]),
                "Task",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, GatewayError> {
        self.rows(
            self.table(Method::GET, "tasks").query(&[
                ("project_id", eq(project_id)),
                ("select", "*".into()),
                ("order", "position.asc".into()),
            ]),
            "Tasks",
        )
        .await
    }

    async fn list_assigned_tasks(&self, assignee_id: Uuid) -> Result<Vec<Task>, GatewayError> {
        self.rows(
            self.table(Method::GET, "tasks").query(&[
                ("assignee_id", eq(assignee_id)),
                ("select", "*".into()),
                ("order", "due_date.asc.nullslast".into()),
            ]),
            "Tasks",
        )
        .await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, GatewayError> {
        self.one(self.table(Method::POST, "tasks").json(task), "Task")
            .await
    }

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, GatewayError> {
        self.one(
            self.table(Method::PATCH, "tasks")
                .query(&[("id", eq(id))])
                .json(patch),
            &format!("Task {}", id),
        )
        .await
    }

    async fn update_positions(
        &self,
        updates: &[PositionUpdate],
    ) -> Result<Vec<Task>, PartialWrite> {
        let mut stored = Vec::with_capacity(updates.len());
        for update in updates {
            match self.update_task(update.id, &TaskPatch::from(*update)).await {
                Ok(row) => stored.push(row),
                Err(source) => return Err(PartialWrite { stored, source }),
            }
        }
        Ok(stored)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, GatewayError> {
        let mut query = vec![
            ("user_id", eq(user_id)),
            ("select", "*".to_string()),
            ("order", "created_at.desc".into()),
            ("limit", limit.to_string()),
        ];
        if unread_only {
            query.push(("is_read", eq(false)));
        }
        self.rows(
            self.table(Method::GET, "notifications").query(&query),
            "Notifications",
        )
        .await
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<Notification, GatewayError> {
        self.one(
            self.table(Method::PATCH, "notifications")
                .query(&[("id", eq(id))])
                .json(&json!({ "is_read": true, "read_at": read_at })),
            &format!("Notification {}", id),
        )
        .await
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<usize, GatewayError> {
        let rows: Vec<serde_json::Value> = self
            .rows(
                self.table(Method::PATCH, "notifications")
                    .query(&[
                        ("user_id", eq(user_id)),
                        ("is_read", eq(false)),
                        ("select", "id".into()),
                    ])
                    .json(&json!({ "is_read": true, "read_at": read_at })),
                "Notifications",
            )
            .await?;
        Ok(rows.len())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, GatewayError> {
        let rows: Vec<Profile> = self
            .rows(
                self.table(Method::GET, "profiles")
                    .query(&[("id", eq(user_id)), ("select", "*".into())]),
                "Profile",
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AuthApi for RestGateway {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, GatewayError> {
        let builder = self
            .request(Method::POST, "/auth/v1/token", &self.anon_key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let response = check(builder.send().await?, "Account").await?;
        let token: TokenResponse = decode(response).await?;
        Ok(token.into_session())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUp, GatewayError> {
        let builder = self
            .request(Method::POST, "/auth/v1/signup", &self.anon_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }));
        let response = check(builder.send().await?, "Account").await?;
        let body: serde_json::Value = decode(response).await?;
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            return Ok(SignUp::Session(token.into_session()));
        }
        // Without a session the body is the user, possibly wrapped.
        let user = body.get("user").cloned().unwrap_or(body);
        let user: AuthUser =
            serde_json::from_value(user).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(SignUp::ConfirmationRequired(user))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        let builder = self
            .request(Method::POST, "/auth/v1/token", &self.anon_key)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        let response = check(builder.send().await?, "Session").await?;
        let token: TokenResponse = decode(response).await?;
        Ok(token.into_session())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let builder = self.request(Method::POST, "/auth/v1/logout", access_token);
        check(builder.send().await?, "Session").await?;
        Ok(())
    }

    fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = token;
    }
}

impl RestGateway {
    async fn call_function<T: DeserializeOwned>(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<T, ApprovalError> {
        let response = self
            .request(Method::POST, &format!("/functions/v1/{}", name), &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(function = name, error = %e, "approval request failed");
                ApprovalError::Network
            })?;
        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            tracing::debug!(function = name, status = status.as_u16(), code = ?body.code(), "approval rejected");
            return Err(approval_error(status, body.code()));
        }
        response.json::<T>().await.map_err(|e| {
            tracing::warn!(function = name, error = %e, "unexpected approval response");
            ApprovalError::Unavailable
        })
    }
}

fn approval_error(status: StatusCode, code: Option<&str>) -> ApprovalError {
    match (code, status) {
        (Some("invalid_token" | "token_expired"), _) => ApprovalError::InvalidOrExpired,
        (Some("already_decided"), _) => ApprovalError::AlreadyDecided,
        (_, StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::UNAUTHORIZED) => {
            ApprovalError::InvalidOrExpired
        }
        (_, StatusCode::CONFLICT) => ApprovalError::AlreadyDecided,
        _ => ApprovalError::Unavailable,
    }
}

#[async_trait]
impl ApprovalEndpoint for RestGateway {
    async fn fetch_approval(&self, token: &str) -> Result<ApprovalDetails, ApprovalError> {
        self.call_function("approval-details", json!({ "token": token }))
            .await
    }

    async fn submit_approval(
        &self,
        token: &str,
        decision: Decision,
        comment: Option<&str>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        self.call_function(
            "approval-decision",
            json!({ "token": token, "decision": decision.as_str(), "comment": comment }),
        )
        .await
    }
}
