//! Turns a notification action (accept, decline, cancel...) into a confirmed
//! appointment status and a read notification, then resynchronises both stores.
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::AppointmentPatch;
use crate::error::{ClientError, ClientResult};
use crate::model::{AppointmentStatus, Notification, Role};
use crate::notice::{Notice, Notifier};
use crate::store::{AppointmentStore, NotificationStore, Refreshable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Accept,
    Decline,
    /// Cancel an appointment that was already confirmed.
    Cancel,
    /// Re-confirm an appointment that was cancelled.
    Reaccept,
}

impl NotificationAction {
    pub fn target(&self) -> AppointmentStatus {
        match self {
            NotificationAction::Accept | NotificationAction::Reaccept => {
                AppointmentStatus::Confirmed
            }
            NotificationAction::Decline | NotificationAction::Cancel => {
                AppointmentStatus::Cancelled
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::Accept => "Accept",
            NotificationAction::Decline => "Decline",
            NotificationAction::Cancel => "Cancel",
            NotificationAction::Reaccept => "Re-accept",
        }
    }
}

/// Request buttons (accept/decline) stay enabled until the appointment
/// reaches a terminal status. `tentative` is still pending.
pub fn request_buttons_enabled(status: AppointmentStatus) -> bool {
    !status.is_terminal()
}

/// Actions offered for a notification, given the appointment's live status
/// when the store has it, or the status recorded in the notification otherwise.
pub fn available_actions(
    notification: &Notification,
    live_status: Option<AppointmentStatus>,
) -> Vec<NotificationAction> {
    let Some((_, notice)) = notification.appointment_request() else {
        return Vec::new();
    };
    let status = live_status
        .or(notice.current_status)
        .unwrap_or(AppointmentStatus::Pending);
    match status {
        AppointmentStatus::Pending | AppointmentStatus::Tentative => {
            vec![NotificationAction::Accept, NotificationAction::Decline]
        }
        AppointmentStatus::Confirmed => vec![NotificationAction::Cancel],
        AppointmentStatus::Cancelled => vec![NotificationAction::Reaccept],
        AppointmentStatus::Completed | AppointmentStatus::Scheduled => Vec::new(),
    }
}

/// Text of the success notice for a status change. A patient moving an
/// appointment to `tentative` has only *asked* for a cancellation.
pub fn status_message(actor: Role, status: AppointmentStatus) -> String {
    match (actor, status) {
        (Role::Patient, AppointmentStatus::Tentative) => {
            "Cancellation request sent successfully".to_string()
        }
        _ => format!("Appointment status updated to {}", status),
    }
}

/// What happened after the appointment update was confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: AppointmentStatus,
    pub notification_marked: bool,
    pub appointments_refreshed: bool,
    pub notifications_refreshed: bool,
}

/// Sequences calls against the appointment and notification stores. Holds no
/// state of its own.
pub struct Reconciler {
    appointments: Arc<AppointmentStore>,
    notifications: Arc<NotificationStore>,
    notifier: Arc<dyn Notifier>,
    actor: Role,
}

impl Reconciler {
    pub fn new(
        appointments: Arc<AppointmentStore>,
        notifications: Arc<NotificationStore>,
        notifier: Arc<dyn Notifier>,
        actor: Role,
    ) -> Self {
        Self {
            appointments,
            notifications,
            notifier,
            actor,
        }
    }

    /// Apply `new_status` to the appointment, then retire the notification.
    ///
    /// The notification is only marked read after the server confirmed the
    /// status change; a failed update stops here with a single error notice and
    /// no refresh. A failed read-mark is reported but does not undo the update.
    /// The read-mark and both refreshes run concurrently.
    #[instrument(
        skip_all,
        fields(
            appointment_id = %appointment_id,
            status = %new_status,
            notification_id = %notification_id
        )
    )]
    pub async fn resolve_notification_action(
        &self,
        appointment_id: &str,
        new_status: AppointmentStatus,
        notification_id: &str,
    ) -> ClientResult<Resolution> {
        let patch = AppointmentPatch::status(new_status);
        if let Err(err) = self.appointments.update_appointment(appointment_id, &patch).await {
            self.notifier.notify(Notice::error(format!(
                "Failed to update appointment: {}",
                err.user_message()
            )));
            return Err(err);
        }
        self.notifier
            .notify(Notice::success(status_message(self.actor, new_status)));

        let (marked, appointments, notifications) = futures::join!(
            self.notifications.mark_as_read(notification_id),
            self.appointments.invalidate(),
            self.notifications.invalidate()
        );

        if let Err(err) = &marked {
            warn!(?err, "appointment updated but notification was not marked read");
            self.notifier.notify(Notice::warning(
                "Appointment updated, but the notification could not be marked as read",
            ));
        }
        for (store, res) in [
            (self.appointments.name(), &appointments),
            (self.notifications.name(), &notifications),
        ] {
            if let Err(err) = res {
                warn!(?err, store, "refresh after status change failed");
                self.notifier
                    .notify(Notice::error(format!("Failed to refresh {}", store)));
            }
        }

        info!("notification action resolved");
        Ok(Resolution {
            status: new_status,
            notification_marked: marked.is_ok(),
            appointments_refreshed: appointments.is_ok(),
            notifications_refreshed: notifications.is_ok(),
        })
    }

    /// Run `action` for a request notification.
    pub async fn apply(
        &self,
        notification: &Notification,
        action: NotificationAction,
    ) -> ClientResult<Resolution> {
        let Some((appointment_id, _)) = notification.appointment_request() else {
            let err =
                ClientError::validation("This notification has no pending appointment request");
            self.notifier.notify(Notice::warning(err.user_message()));
            return Err(err);
        };
        self.resolve_notification_action(appointment_id, action.target(), &notification.id)
            .await
    }
}
