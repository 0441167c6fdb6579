//! Change feed for the tasks of one project.
//!
//! A [`RealtimeConnector`] opens a [`Subscription`]: a receiver of
//! [`RealtimeMessage`]s fed by a background task. The feed is at-least-once
//! and unordered relative to this client's own writes; ordering is restored
//! by the board's reconcile rule, not here.
//!
//! Every successful (re)join yields [`RealtimeMessage::Joined`]. Changes may
//! have been missed before a re-join, so consumers treat any `Joined` after
//! the first as "reload from scratch".

pub mod phoenix;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use spaces_common::Task;

use crate::errors::RealtimeError;

pub use phoenix::PhoenixRealtime;

/// Buffered messages per subscription before the feed task waits.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// One row change observed on the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Task),
    Updated(Task),
    Deleted { id: Uuid },
}

impl ChangeEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Inserted(task) | Self::Updated(task) => task.id,
            Self::Deleted { id } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "insert",
            Self::Updated(_) => "update",
            Self::Deleted { .. } => "delete",
        }
    }
}

/// Wire shape of a `postgres_changes` record.
#[derive(Debug, Deserialize)]
pub(crate) struct RowChange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RowId {
    id: Uuid,
}

impl RowChange {
    /// Decode into a [`ChangeEvent`]; `None` for unknown kinds or rows that
    /// do not parse.
    pub(crate) fn into_event(self) -> Option<ChangeEvent> {
        match self.kind.as_str() {
            "INSERT" => serde_json::from_value(self.record?)
                .ok()
                .map(ChangeEvent::Inserted),
            "UPDATE" => serde_json::from_value(self.record?)
                .ok()
                .map(ChangeEvent::Updated),
            "DELETE" => serde_json::from_value::<RowId>(self.old_record?)
                .ok()
                .map(|row| ChangeEvent::Deleted { id: row.id }),
            _ => None,
        }
    }
}

/// What to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub project_id: Uuid,
}

impl ChannelSpec {
    pub fn for_project(project_id: Uuid) -> Self {
        Self { project_id }
    }

    pub fn topic(&self) -> String {
        format!("realtime:project-tasks:{}", self.project_id)
    }

    /// Server-side row filter.
    pub fn filter(&self) -> String {
        format!("project_id=eq.{}", self.project_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeMessage {
    Joined,
    Change(ChangeEvent),
    Closed,
}

/// A live channel. Dropping it aborts the feed task; [`Subscription::unsubscribe`]
/// leaves the channel cleanly first.
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<RealtimeMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        topic: String,
        rx: mpsc::Receiver<RealtimeMessage>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            topic,
            rx,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message; `None` once the feed task has ended.
    pub async fn recv(&mut self) -> Option<RealtimeMessage> {
        self.rx.recv().await
    }

    /// Release the channel and wait for the feed task to finish.
    ///
    /// Unread messages are discarded. Closing the receiver first wakes a feed
    /// task parked on a full buffer.
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.rx.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!(topic = %self.topic, "realtime channel released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, RealtimeError>;

    /// User token for later joins. Connectors without auth ignore it.
    fn set_access_token(&self, _token: Option<String>) {}
}
