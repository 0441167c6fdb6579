//! Notification inbox of the signed-in user.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use spaces_common::Notification;

use crate::errors::GatewayError;
use crate::gateway::DataGateway;

pub const PAGE_SIZE: usize = 50;

pub struct Inbox {
    gateway: Arc<dyn DataGateway>,
    user_id: Uuid,
    items: Vec<Notification>,
}

impl Inbox {
    /// Fetch the newest notifications of `user_id`.
    pub async fn load(
        gateway: Arc<dyn DataGateway>,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Self, GatewayError> {
        let items = gateway
            .list_notifications(user_id, unread_only, PAGE_SIZE)
            .await?;
        tracing::debug!(%user_id, count = items.len(), "inbox loaded");
        Ok(Self {
            gateway,
            user_id,
            items,
        })
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    /// Mark one notification read. Already-read items are left alone.
    pub async fn mark_read(&mut self, id: Uuid) -> Result<(), GatewayError> {
        let item = self
            .items
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GatewayError::NotFound {
                what: format!("Notification {}", id),
            })?;
        if item.is_read {
            return Ok(());
        }
        *item = self.gateway.mark_notification_read(id, Utc::now()).await?;
        Ok(())
    }

    /// Mark everything read. Returns how many notifications changed.
    pub async fn mark_all_read(&mut self) -> Result<usize, GatewayError> {
        if self.unread_count() == 0 {
            return Ok(0);
        }
        let read_at = Utc::now();
        let changed = self
            .gateway
            .mark_all_notifications_read(self.user_id, read_at)
            .await?;
        for item in self.items.iter_mut().filter(|n| !n.is_read) {
            item.is_read = true;
            item.read_at = Some(read_at);
        }
        tracing::info!(user_id = %self.user_id, changed, "inbox marked read");
        Ok(changed)
    }
}
