use uuid::Uuid;

use crate::errors::RealtimeError;
use crate::realtime::{ChangeEvent, ChannelSpec, RealtimeConnector, RealtimeMessage, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// First successful join.
    Live,
    Change(ChangeEvent),
    /// Re-joined after a gap; local state must be reloaded.
    Resync,
    Closed,
}

/// Task change feed of the open project.
pub struct RealtimeListener {
    project_id: Uuid,
    subscription: Subscription,
    joined: bool,
}

impl RealtimeListener {
    pub async fn start(
        connector: &dyn RealtimeConnector,
        project_id: Uuid,
    ) -> Result<Self, RealtimeError> {
        let subscription = connector
            .subscribe(ChannelSpec::for_project(project_id))
            .await?;
        tracing::debug!(%project_id, topic = subscription.topic(), "realtime listener started");
        Ok(Self {
            project_id,
            subscription,
            joined: false,
        })
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn is_live(&self) -> bool {
        self.joined
    }

    pub async fn next(&mut self) -> ListenerEvent {
        match self.subscription.recv().await {
            Some(RealtimeMessage::Joined) if !self.joined => {
                self.joined = true;
                ListenerEvent::Live
            }
            Some(RealtimeMessage::Joined) => {
                tracing::info!(project_id = %self.project_id, "realtime re-joined, resyncing");
                ListenerEvent::Resync
            }
            Some(RealtimeMessage::Change(event)) => ListenerEvent::Change(event),
            Some(RealtimeMessage::Closed) | None => ListenerEvent::Closed,
        }
    }

    /// Leave the channel and wait for the feed task to end.
    pub async fn stop(self) {
        self.subscription.unsubscribe().await;
    }
}
