use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::{Cache, Refreshable, Snapshot};
use crate::api::{AppointmentPatch, AppointmentScope, ClinicApi};
use crate::error::{ClientError, ClientResult};
use crate::model::Appointment;

/// Cache of the appointments visible to the current actor.
///
/// There is no optimistic mutation here: `update_appointment` only marks the
/// cache stale, and callers see the new state after a refresh.
pub struct AppointmentStore {
    api: Arc<dyn ClinicApi>,
    scope: RwLock<AppointmentScope>,
    cache: Cache<Appointment>,
}

impl AppointmentStore {
    pub fn new(api: Arc<dyn ClinicApi>, scope: AppointmentScope) -> Self {
        Self {
            api,
            scope: RwLock::new(scope),
            cache: Cache::new(),
        }
    }

    pub async fn scope(&self) -> AppointmentScope {
        self.scope.read().await.clone()
    }

    /// Switch to a different slice (e.g. another calendar week); the next read refetches.
    pub async fn set_scope(&self, scope: AppointmentScope) {
        *self.scope.write().await = scope;
        self.cache.mark_stale().await;
    }

    #[instrument(skip_all, fields(appointment_id = %id))]
    pub async fn update_appointment(&self, id: &str, patch: &AppointmentPatch) -> ClientResult<()> {
        if id.trim().is_empty() {
            return Err(ClientError::validation("An appointment must be selected"));
        }
        if patch.is_empty() {
            return Err(ClientError::validation("Nothing to update"));
        }
        if let Err(err) = self.api.update_appointment(id, patch).await {
            warn!(?err, "appointment update failed");
            return Err(err);
        }
        info!(status = ?patch.status, "appointment updated");
        self.cache.mark_stale().await;
        Ok(())
    }

    /// Unconditionally re-fetch the whole collection and replace the cache.
    #[instrument(skip_all)]
    pub async fn refresh_appointments(&self) -> ClientResult<()> {
        let scope = self.scope().await;
        let res = self
            .cache
            .refetch(|| self.api.list_appointments(&scope))
            .await;
        if let Err(err) = &res {
            warn!(?err, "appointment refresh failed");
        }
        res
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.cache.items().await
    }

    /// Like `appointments`, but waits for an in-flight refresh and refetches when stale.
    pub async fn fresh(&self) -> ClientResult<Vec<Appointment>> {
        let scope = self.scope().await;
        self.cache
            .fresh(|| self.api.list_appointments(&scope))
            .await
    }

    pub async fn get(&self, id: &str) -> Option<Appointment> {
        self.cache.find(|a| a.id == id).await
    }

    pub async fn snapshot(&self) -> Snapshot<Appointment> {
        self.cache.snapshot().await
    }

    pub async fn is_loading(&self) -> bool {
        self.cache.is_loading().await
    }
}

#[async_trait]
impl Refreshable for AppointmentStore {
    fn name(&self) -> &'static str {
        "appointments"
    }

    async fn invalidate(&self) -> ClientResult<()> {
        self.cache.mark_stale().await;
        self.refresh_appointments().await
    }
}
