use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{Cache, Refreshable, Snapshot};
use crate::api::ClinicApi;
use crate::error::{ClientError, ClientResult};
use crate::model::Notification;

/// Inbox of the current actor.
///
/// `mark_as_read`, `delete_notification` and `mark_all_as_read` wait for the
/// server to confirm and only then patch the cached entries; a failed call
/// leaves the cache untouched.
pub struct NotificationStore {
    api: Arc<dyn ClinicApi>,
    user_id: String,
    cache: Cache<Notification>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn ClinicApi>, user_id: impl Into<String>) -> Self {
        Self {
            api,
            user_id: user_id.into(),
            cache: Cache::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[instrument(skip_all, fields(user_id = %self.user_id))]
    pub async fn refresh_notifications(&self) -> ClientResult<()> {
        let res = self
            .cache
            .refetch(|| self.api.list_notifications(&self.user_id))
            .await;
        if let Err(err) = &res {
            warn!(?err, "notification refresh failed");
        }
        res
    }

    #[instrument(skip_all, fields(notification_id = %id))]
    pub async fn mark_as_read(&self, id: &str) -> ClientResult<()> {
        if let Err(err) = self.api.set_notification_read(id, true).await {
            warn!(?err, "mark as read failed");
            return Err(err);
        }
        let id = id.to_string();
        self.cache
            .patch(move |items| {
                items
                    .iter_mut()
                    .filter(|n| n.id == id)
                    .for_each(|n| n.is_read = true)
            })
            .await;
        debug!("notification marked read");
        Ok(())
    }

    /// Deleting an id the server no longer knows is treated as already done.
    #[instrument(skip_all, fields(notification_id = %id))]
    pub async fn delete_notification(&self, id: &str) -> ClientResult<()> {
        match self.api.delete_notification(id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => debug!("notification already deleted"),
            Err(err) => {
                warn!(?err, "delete notification failed");
                return Err(err);
            }
        }
        let id = id.to_string();
        self.cache.patch(move |items| items.retain(|n| n.id != id)).await;
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %self.user_id))]
    pub async fn mark_all_as_read(&self) -> ClientResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(ClientError::validation("No user session"));
        }
        if let Err(err) = self.api.mark_all_notifications_read(&self.user_id).await {
            warn!(?err, "mark all as read failed");
            return Err(err);
        }
        // Only entries the user saw; anything the server added since stays unread.
        let seen: HashSet<String> = self
            .cache
            .items()
            .await
            .into_iter()
            .map(|n| n.id)
            .collect();
        self.cache
            .patch(move |items| {
                items
                    .iter_mut()
                    .filter(|n| seen.contains(&n.id))
                    .for_each(|n| n.is_read = true)
            })
            .await;
        info!("all notifications marked read");
        Ok(())
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.cache.items().await
    }

    pub async fn fresh(&self) -> ClientResult<Vec<Notification>> {
        self.cache
            .fresh(|| self.api.list_notifications(&self.user_id))
            .await
    }

    pub async fn get(&self, id: &str) -> Option<Notification> {
        self.cache.find(|n| n.id == id).await
    }

    pub async fn unread_count(&self) -> usize {
        self.cache
            .items()
            .await
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    pub async fn snapshot(&self) -> Snapshot<Notification> {
        self.cache.snapshot().await
    }

    pub async fn is_loading(&self) -> bool {
        self.cache.is_loading().await
    }
}

#[async_trait]
impl Refreshable for NotificationStore {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn invalidate(&self) -> ClientResult<()> {
        self.cache.mark_stale().await;
        self.refresh_notifications().await
    }
}
