//! In-process backend.
//!
//! Behaves like the hosted service for everything the client relies on:
//! server-assigned ids and strictly increasing `updated_at` stamps, a change
//! feed for every task write, delayed profile provisioning after sign-up,
//! and one-shot approval tokens. Faults can be injected to exercise
//! rollback and retry paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use spaces_common::{
    ApprovalDetails, Decision, DecisionOutcome, NewProject, NewTask, Notification,
    PositionUpdate, Profile, Project, ProjectPatch, Task, TaskPatch,
};

use super::{ApprovalEndpoint, AuthApi, AuthUser, DataGateway, Session, SignUp};
use crate::errors::{ApprovalError, GatewayError, PartialWrite, RealtimeError};
use crate::realtime::{
    ChangeEvent, ChannelSpec, RealtimeConnector, RealtimeMessage, SUBSCRIPTION_BUFFER,
    Subscription,
};

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum FeedItem {
    Change { project_id: Uuid, event: ChangeEvent },
    Rejoin,
}

struct StoredApproval {
    details: ApprovalDetails,
    expires_at: Option<DateTime<Utc>>,
}

struct Account {
    password: String,
    user: AuthUser,
}

/// Profile rows still being provisioned: lookups left before they appear.
struct PendingProfile {
    profile: Profile,
    lookups_left: u32,
}

#[derive(Default)]
struct State {
    projects: HashMap<Uuid, Project>,
    tasks: HashMap<Uuid, Task>,
    notifications: Vec<Notification>,
    profiles: HashMap<Uuid, Profile>,
    pending_profiles: HashMap<Uuid, PendingProfile>,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Uuid>,
    approvals: HashMap<String, StoredApproval>,
    last_stamp: Option<DateTime<Utc>>,
    access_token: Option<String>,
}

impl State {
    /// Server clock: never repeats and never goes backwards.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

pub struct MemoryGateway {
    state: Mutex<State>,
    feed: broadcast::Sender<FeedItem>,
    organization_id: Uuid,
    profile_delay: u32,
    requests: AtomicUsize,
    writes: AtomicUsize,
    /// Writes allowed to succeed before failures start.
    writes_before_fault: AtomicUsize,
    /// Failing writes still to inject.
    faulty_writes: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            feed,
            organization_id: Uuid::new_v4(),
            profile_delay: 0,
            requests: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            writes_before_fault: AtomicUsize::new(0),
            faulty_writes: AtomicUsize::new(0),
            failing_reads: AtomicUsize::new(0),
        }
    }

    /// Profiles created by sign-up become visible only after `lookups`
    /// `get_profile` calls, like a server-side trigger that lags behind.
    pub fn with_profile_delay(mut self, lookups: u32) -> Self {
        self.profile_delay = lookups;
        self
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-write.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Fault injection and counters ──────────────────────────────────

    /// Fail the next `count` write requests.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Let `ok` writes through, then fail the following `count`.
    pub fn fail_writes_after(&self, ok: usize, count: usize) {
        self.writes_before_fault.store(ok, Ordering::SeqCst);
        self.faulty_writes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` read requests.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Requests of any kind received so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Write requests received so far, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn begin_read(&self) -> Result<(), GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.failing_reads) {
            return Err(GatewayError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    fn begin_write(&self) -> Result<(), GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.faulty_writes.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        if Self::take_one(&self.writes_before_fault) {
            return Ok(());
        }
        if Self::take_one(&self.faulty_writes) {
            return Err(GatewayError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn publish(&self, project_id: Uuid, event: ChangeEvent) {
        // No receivers is fine.
        let _ = self.feed.send(FeedItem::Change { project_id, event });
    }

    // ── Seeding helpers ───────────────────────────────────────────────

    pub fn seed_project(&self, name: &str) -> Project {
        let mut state = self.lock();
        let now = state.stamp();
        let project = Project {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            name: name.to_string(),
            description: None,
            client_name: None,
            client_email: None,
            color: "#6366f1".into(),
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        state.projects.insert(project.id, project.clone());
        project
    }

    /// Insert a task row as-is (position and status taken verbatim), without
    /// emitting a change event.
    pub fn seed_task(
        &self,
        project_id: Uuid,
        title: &str,
        status: spaces_common::TaskStatus,
        position: i32,
    ) -> Task {
        let mut state = self.lock();
        let now = state.stamp();
        let task = Task {
            id: Uuid::new_v4(),
            project_id,
            organization_id: self.organization_id,
            title: title.to_string(),
            description: None,
            status,
            priority: Default::default(),
            position,
            assignee_id: None,
            due_date: None,
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(task.id, task.clone());
        task
    }

    pub fn seed_notification(&self, notification: Notification) {
        self.lock().notifications.push(notification);
    }

    /// Register an account whose profile already exists.
    pub fn seed_account(&self, email: &str, password: &str, full_name: Option<&str>) -> Profile {
        let mut state = self.lock();
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        let profile = Profile {
            id: user.id,
            organization_id: self.organization_id,
            full_name: full_name.map(str::to_string),
            email: email.to_string(),
            role: Some("member".into()),
            avatar_url: None,
        };
        state.profiles.insert(user.id, profile.clone());
        state.accounts.insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                user,
            },
        );
        profile
    }

    pub fn seed_approval(
        &self,
        token: &str,
        details: ApprovalDetails,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.lock().approvals.insert(
            token.to_string(),
            StoredApproval {
                details,
                expires_at,
            },
        );
    }

    /// Stored state of an approval, for assertions.
    pub fn approval_state(&self, token: &str) -> Option<ApprovalDetails> {
        self.lock().approvals.get(token).map(|a| a.details.clone())
    }

    /// Stored row of a task, for assertions.
    pub fn stored_task(&self, id: Uuid) -> Option<Task> {
        self.lock().tasks.get(&id).cloned()
    }

    /// Bearer token most recently installed through [`AuthApi::set_access_token`].
    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// Remove a task the way another client or an admin would, emitting a
    /// delete event.
    pub fn delete_task_externally(&self, id: Uuid) -> Option<Task> {
        let removed = self.lock().tasks.remove(&id);
        if let Some(task) = &removed {
            self.publish(task.project_id, ChangeEvent::Deleted { id });
        }
        removed
    }

    /// Make every open subscription re-join, as after a dropped connection.
    pub fn simulate_rejoin(&self) {
        let _ = self.feed.send(FeedItem::Rejoin);
    }

    fn update_task_row(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, GatewayError> {
        let (task, previous_project) = {
            let mut state = self.lock();
            let stamp = state.stamp();
            let task = state.tasks.get_mut(&id).ok_or_else(|| GatewayError::NotFound {
                what: format!("Task {}", id),
            })?;
            let previous_project = task.project_id;
            if let Some(title) = &patch.title {
                task.title = title.clone();
            }
            if let Some(description) = &patch.description {
                task.description = description.clone();
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(position) = patch.position {
                task.position = position;
            }
            if let Some(assignee) = patch.assignee_id {
                task.assignee_id = assignee;
            }
            if let Some(due) = patch.due_date {
                task.due_date = due;
            }
            task.updated_at = stamp;
            (task.clone(), previous_project)
        };
        self.publish(previous_project, ChangeEvent::Updated(task.clone()));
        Ok(task)
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>, GatewayError> {
        self.begin_read()?;
        let state = self.lock();
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| include_archived || !p.is_archived)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, GatewayError> {
        self.begin_read()?;
        Ok(self.lock().projects.get(&id).cloned())
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, GatewayError> {
        self.begin_write()?;
        let mut state = self.lock();
        let now = state.stamp();
        let row = Project {
            id: Uuid::new_v4(),
            organization_id: project.organization_id,
            name: project.name.clone(),
            description: project.description.clone(),
            client_name: project.client_name.clone(),
            client_email: project.client_email.clone(),
            color: project.color.clone(),
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        state.projects.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_project(
        &self,
        id: Uuid,
        patch: &ProjectPatch,
    ) -> Result<Project, GatewayError> {
        self.begin_write()?;
        let mut state = self.lock();
        let stamp = state.stamp();
        let project = state.projects.get_mut(&id).ok_or_else(|| GatewayError::NotFound {
            what: format!("Project {}", id),
        })?;
        if let Some(name) = &patch.name {
            project.name = name.clone();
        }
        if let Some(description) = &patch.description {
            project.description = Some(description.clone());
        }
        if let Some(client) = &patch.client_name {
            project.client_name = Some(client.clone());
        }
        if let Some(email) = &patch.client_email {
            project.client_email = Some(email.clone());
        }
        if let Some(color) = &patch.color {
            project.color = color.clone();
        }
        if let Some(archived) = patch.is_archived {
            project.is_archived = archived;
        }
        project.updated_at = stamp;
        Ok(project.clone())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, GatewayError> {
        self.begin_read()?;
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, GatewayError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn list_assigned_tasks(&self, assignee_id: Uuid) -> Result<Vec<Task>, GatewayError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.assignee_id == Some(assignee_id))
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, GatewayError> {
        self.begin_write()?;
        let row = {
            let mut state = self.lock();
            if !state.projects.contains_key(&task.project_id) {
                return Err(GatewayError::Rejected {
                    status: 409,
                    message: "insert violates foreign key constraint".into(),
                });
            }
            let now = state.stamp();
            let row = Task {
                id: Uuid::new_v4(),
                project_id: task.project_id,
                organization_id: task.organization_id,
                title: task.title.clone(),
                description: task.description.clone(),
                status: task.status,
                priority: task.priority,
                position: task.position,
                assignee_id: task.assignee_id,
                due_date: task.due_date,
                created_at: now,
                updated_at: now,
            };
            state.tasks.insert(row.id, row.clone());
            row
        };
        self.publish(row.project_id, ChangeEvent::Inserted(row.clone()));
        Ok(row)
    }

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, GatewayError> {
        self.begin_write()?;
        self.update_task_row(id, patch)
    }

    async fn update_positions(
        &self,
        updates: &[PositionUpdate],
    ) -> Result<Vec<Task>, PartialWrite> {
        let mut stored = Vec::with_capacity(updates.len());
        for update in updates {
            let written = self
                .begin_write()
                .and_then(|()| self.update_task_row(update.id, &TaskPatch::from(*update)));
            match written {
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
        self.begin_read()?;
        let state = self.lock();
        let mut rows: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<Notification, GatewayError> {
        self.begin_write()?;
        let mut state = self.lock();
        let row = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GatewayError::NotFound {
                what: format!("Notification {}", id),
            })?;
        row.is_read = true;
        row.read_at = Some(read_at);
        Ok(row.clone())
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<usize, GatewayError> {
        self.begin_write()?;
        let mut state = self.lock();
        let mut changed = 0;
        for row in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            row.is_read = true;
            row.read_at = Some(read_at);
            changed += 1;
        }
        Ok(changed)
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, GatewayError> {
        self.begin_read()?;
        let mut state = self.lock();
        if let Some(profile) = state.profiles.get(&user_id) {
            return Ok(Some(profile.clone()));
        }
        let ready = match state.pending_profiles.get_mut(&user_id) {
            Some(pending) if pending.lookups_left == 0 => true,
            Some(pending) => {
                pending.lookups_left -= 1;
                false
            }
            None => false,
        };
        if ready {
            if let Some(pending) = state.pending_profiles.remove(&user_id) {
                state.profiles.insert(user_id, pending.profile.clone());
                return Ok(Some(pending.profile));
            }
        }
        Ok(None)
    }
}

impl MemoryGateway {
    fn open_session(state: &mut State, user: AuthUser) -> Session {
        let access_token = Uuid::new_v4().to_string();
        state.sessions.insert(access_token.clone(), user.id);
        Session {
            access_token,
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user,
        }
    }
}

#[async_trait]
impl AuthApi for MemoryGateway {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, GatewayError> {
        self.begin_read()?;
        let mut state = self.lock();
        let user = match state.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => {
                return Err(GatewayError::Rejected {
                    status: 400,
                    message: "Invalid login credentials".into(),
                });
            }
        };
        Ok(Self::open_session(&mut state, user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUp, GatewayError> {
        self.begin_write()?;
        let mut state = self.lock();
        let key = email.to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(GatewayError::Rejected {
                status: 422,
                message: "User already registered".into(),
            });
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        state.accounts.insert(
            key,
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        state.pending_profiles.insert(
            user.id,
            PendingProfile {
                profile: Profile {
                    id: user.id,
                    organization_id: self.organization_id,
                    full_name: full_name.map(str::to_string),
                    email: email.to_string(),
                    role: Some("member".into()),
                    avatar_url: None,
                },
                lookups_left: self.profile_delay,
            },
        );
        Ok(SignUp::Session(Self::open_session(&mut state, user)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        self.begin_read()?;
        if refresh_token.is_empty() {
            return Err(GatewayError::Unauthorized);
        }
        let mut state = self.lock();
        // Refresh tokens are opaque here; any known account's session renews.
        let user = state
            .accounts
            .values()
            .next()
            .map(|a| a.user.clone())
            .ok_or(GatewayError::Unauthorized)?;
        Ok(Self::open_session(&mut state, user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        self.begin_write()?;
        self.lock().sessions.remove(access_token);
        Ok(())
    }

    fn set_access_token(&self, token: Option<String>) {
        self.lock().access_token = token;
    }
}

#[async_trait]
impl ApprovalEndpoint for MemoryGateway {
    async fn fetch_approval(&self, token: &str) -> Result<ApprovalDetails, ApprovalError> {
        self.begin_read().map_err(|_| ApprovalError::Network)?;
        let state = self.lock();
        match state.approvals.get(token) {
            Some(stored) if stored.expires_at.is_some_and(|at| at <= Utc::now()) => {
                Err(ApprovalError::InvalidOrExpired)
            }
            Some(stored) => Ok(stored.details.clone()),
            None => Err(ApprovalError::InvalidOrExpired),
        }
    }

    async fn submit_approval(
        &self,
        token: &str,
        decision: Decision,
        comment: Option<&str>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        self.begin_write().map_err(|_| ApprovalError::Network)?;
        let mut state = self.lock();
        let now = state.stamp();
        let stored = state
            .approvals
            .get_mut(token)
            .ok_or(ApprovalError::InvalidOrExpired)?;
        if stored.expires_at.is_some_and(|at| at <= now) {
            return Err(ApprovalError::InvalidOrExpired);
        }
        if stored.details.state.is_decided() {
            return Err(ApprovalError::AlreadyDecided);
        }
        stored.details.state = decision.resulting_state();
        stored.details.comment = comment.map(str::to_string);
        stored.details.decided_at = Some(now);
        Ok(DecisionOutcome {
            state: stored.details.state,
            comment: stored.details.comment.clone(),
            decided_at: now,
        })
    }
}

#[async_trait]
impl RealtimeConnector for MemoryGateway {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, RealtimeError> {
        let mut feed = self.feed.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            if tx.send(RealtimeMessage::Joined).await.is_err() {
                return;
            }
            loop {
                let message = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    item = feed.recv() => match item {
                        Ok(FeedItem::Change { project_id, event }) if project_id == spec.project_id => {
                            RealtimeMessage::Change(event)
                        }
                        Ok(FeedItem::Change { .. }) => continue,
                        Ok(FeedItem::Rejoin) => RealtimeMessage::Joined,
                        // Missed events: report a re-join so the consumer reloads.
                        Err(broadcast::error::RecvError::Lagged(_)) => RealtimeMessage::Joined,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if tx.send(message).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(RealtimeMessage::Closed).await;
        });

        Ok(Subscription::new(spec.topic(), rx, shutdown_tx, task))
    }
}
