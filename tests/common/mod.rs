#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use clinic_portal::api::{
    AppointmentPatch, AppointmentScope, ClinicApi, Credentials, LoginOutcome, PaymentRecord,
    PaymentScope, Registration,
};
use clinic_portal::model::{
    Appointment, AppointmentNotice, AppointmentStatus, Notification, NotificationKind, Payment,
    PaymentMethod, PaymentStatus, Role, User,
};
use clinic_portal::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Verify,
    Login,
    Logout,
    Register,
    ListAppointments,
    UpdateAppointment,
    ListNotifications,
    SetRead,
    DeleteNotification,
    MarkAllRead,
    PaymentMethods,
    ListPayments,
    CreatePayment,
    UpdatePayment,
}

#[derive(Default)]
pub struct State {
    pub appointments: Vec<Appointment>,
    pub notifications: Vec<Notification>,
    pub payments: Vec<Payment>,
    pub accounts: Vec<(String, String, User)>,
    pub session: Option<User>,
    pub methods: Option<Vec<PaymentMethod>>,
    pub failing: HashSet<Endpoint>,
    pub delays: HashMap<Endpoint, Duration>,
    /// Wait applied before a list endpoint reads server state.
    pub leads: HashMap<Endpoint, Duration>,
    pub calls: HashMap<Endpoint, usize>,
    pub patches: Vec<(String, AppointmentPatch)>,
    pub created: Vec<PaymentRecord>,
    pub updated: Vec<(String, PaymentRecord)>,
}

/// In-memory backend that records every call and can be told to fail or lag.
#[derive(Clone, Default)]
pub struct FakeClinic {
    pub state: Arc<Mutex<State>>,
}

impl FakeClinic {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_appointment(self, appt: Appointment) -> Self {
        self.state.lock().await.appointments.push(appt);
        self
    }

    pub async fn with_notification(self, n: Notification) -> Self {
        self.state.lock().await.notifications.push(n);
        self
    }

    pub async fn with_payment(self, p: Payment) -> Self {
        self.state.lock().await.payments.push(p);
        self
    }

    pub async fn with_account(self, username: &str, password: &str, role: Role) -> Self {
        let user = User {
            id: Some(format!("U-{}", username)),
            username: username.to_string(),
            role,
            name: None,
        };
        self.state
            .lock()
            .await
            .accounts
            .push((username.to_string(), password.to_string(), user));
        self
    }

    pub async fn fail(&self, endpoint: Endpoint) {
        self.state.lock().await.failing.insert(endpoint);
    }

    pub async fn delay(&self, endpoint: Endpoint, by: Duration) {
        self.state.lock().await.delays.insert(endpoint, by);
    }

    pub async fn delay_before(&self, endpoint: Endpoint, by: Duration) {
        self.state.lock().await.leads.insert(endpoint, by);
    }

    pub async fn calls(&self, endpoint: Endpoint) -> usize {
        self.state.lock().await.calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.state.lock().await.calls.values().sum()
    }

    pub async fn appointment(&self, id: &str) -> Option<Appointment> {
        self.state.lock().await.appointments.iter().find(|a| a.id == id).cloned()
    }

    pub async fn notification(&self, id: &str) -> Option<Notification> {
        self.state.lock().await.notifications.iter().find(|n| n.id == id).cloned()
    }

    /// Count the call, then fail or wait as configured.
    async fn enter(&self, endpoint: Endpoint) -> ClientResult<()> {
        let (fails, delay) = {
            let mut st = self.state.lock().await;
            *st.calls.entry(endpoint).or_insert(0) += 1;
            (st.failing.contains(&endpoint), st.delays.get(&endpoint).copied())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if fails {
            return Err(ClientError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("{:?} failed", endpoint),
            });
        }
        Ok(())
    }

    fn not_found(what: &str) -> ClientError {
        ClientError::Status {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", what),
        }
    }
}

#[async_trait]
impl ClinicApi for FakeClinic {
    async fn verify(&self) -> ClientResult<Option<User>> {
        self.enter(Endpoint::Verify).await?;
        Ok(self.state.lock().await.session.clone())
    }

    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginOutcome> {
        self.enter(Endpoint::Login).await?;
        let mut st = self.state.lock().await;
        let user = st
            .accounts
            .iter()
            .find(|(u, p, _)| *u == credentials.username && *p == credentials.password)
            .map(|(_, _, user)| user.clone())
            .ok_or_else(|| ClientError::Status {
                status: StatusCode::UNAUTHORIZED,
                message: "Invalid credentials".into(),
            })?;
        st.session = Some(user.clone());
        Ok(LoginOutcome {
            user,
            token: Some("token".into()),
        })
    }

    async fn logout(&self) -> ClientResult<()> {
        self.enter(Endpoint::Logout).await?;
        self.state.lock().await.session = None;
        Ok(())
    }

    async fn register(&self, _registration: &Registration) -> ClientResult<()> {
        self.enter(Endpoint::Register).await
    }

    async fn list_appointments(&self, scope: &AppointmentScope) -> ClientResult<Vec<Appointment>> {
        self.lead(Endpoint::ListAppointments).await;
        // The response reflects server state at the moment the request arrives.
        let snapshot: Vec<Appointment> = {
            let mut st = self.state.lock().await;
            *st.calls.entry(Endpoint::ListAppointments).or_insert(0) += 1;
            st.appointments
                .iter()
                .filter(|a| match scope {
                    AppointmentScope::All => true,
                    AppointmentScope::Patient(p) => a.patient_id == *p,
                    AppointmentScope::Doctor { doctor, start, end } => {
                        a.doctor == *doctor && a.date >= *start && a.date <= *end
                    }
                })
                .cloned()
                .collect()
        };
        self.lag_or_fail(Endpoint::ListAppointments).await?;
        Ok(snapshot)
    }

    async fn update_appointment(&self, id: &str, patch: &AppointmentPatch) -> ClientResult<()> {
        self.enter(Endpoint::UpdateAppointment).await?;
        let mut st = self.state.lock().await;
        st.patches.push((id.to_string(), patch.clone()));
        let appt = st
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Self::not_found("appointment"))?;
        if let Some(status) = patch.status {
            appt.status = status;
        }
        Ok(())
    }

    async fn list_notifications(&self, _user_id: &str) -> ClientResult<Vec<Notification>> {
        self.lead(Endpoint::ListNotifications).await;
        let snapshot = {
            let mut st = self.state.lock().await;
            *st.calls.entry(Endpoint::ListNotifications).or_insert(0) += 1;
            st.notifications.clone()
        };
        self.lag_or_fail(Endpoint::ListNotifications).await?;
        Ok(snapshot)
    }

    async fn set_notification_read(&self, id: &str, is_read: bool) -> ClientResult<()> {
        self.enter(Endpoint::SetRead).await?;
        let mut st = self.state.lock().await;
        let n = st
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Self::not_found("notification"))?;
        n.is_read = is_read;
        Ok(())
    }

    async fn delete_notification(&self, id: &str) -> ClientResult<()> {
        self.enter(Endpoint::DeleteNotification).await?;
        let mut st = self.state.lock().await;
        let before = st.notifications.len();
        st.notifications.retain(|n| n.id != id);
        if st.notifications.len() == before {
            return Err(Self::not_found("notification"));
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, _user_id: &str) -> ClientResult<()> {
        self.enter(Endpoint::MarkAllRead).await?;
        let mut st = self.state.lock().await;
        st.notifications.iter_mut().for_each(|n| n.is_read = true);
        Ok(())
    }

    async fn payment_methods(&self) -> ClientResult<Vec<PaymentMethod>> {
        self.enter(Endpoint::PaymentMethods).await?;
        Ok(self.state.lock().await.methods.clone().unwrap_or_default())
    }

    async fn list_payments(&self, scope: &PaymentScope) -> ClientResult<Vec<Payment>> {
        self.enter(Endpoint::ListPayments).await?;
        let st = self.state.lock().await;
        Ok(st
            .payments
            .iter()
            .filter(|p| match scope {
                PaymentScope::Appointment(id) => p.appointment_id == *id,
                PaymentScope::Patient(id) => p.patient_id.as_deref() == Some(id.as_str()),
            })
            .cloned()
            .collect())
    }

    async fn create_payment(&self, record: &PaymentRecord) -> ClientResult<Payment> {
        self.enter(Endpoint::CreatePayment).await?;
        let mut st = self.state.lock().await;
        st.created.push(record.clone());
        let payment = Payment {
            id: format!("PAY{}", st.payments.len() + 1),
            appointment_id: record.appointment_id.clone(),
            patient_id: None,
            amount: record.amount,
            method: record.method,
            date: record.date,
            transaction_id: record.transaction_id.clone(),
            notes: record.notes.clone(),
        };
        st.payments.push(payment.clone());
        if let Some(appt) = st.appointments.iter_mut().find(|a| a.id == record.appointment_id) {
            appt.total_paid += record.amount;
        }
        Ok(payment)
    }

    async fn update_payment(&self, id: &str, record: &PaymentRecord) -> ClientResult<Payment> {
        self.enter(Endpoint::UpdatePayment).await?;
        let mut st = self.state.lock().await;
        st.updated.push((id.to_string(), record.clone()));
        let payment = st
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("payment"))?;
        payment.amount = record.amount;
        payment.method = record.method;
        payment.date = record.date;
        payment.transaction_id = record.transaction_id.clone();
        payment.notes = record.notes.clone();
        Ok(payment.clone())
    }
}

impl FakeClinic {
    async fn lead(&self, endpoint: Endpoint) {
        let lead = self.state.lock().await.leads.get(&endpoint).copied();
        if let Some(d) = lead {
            tokio::time::sleep(d).await;
        }
    }

    async fn lag_or_fail(&self, endpoint: Endpoint) -> ClientResult<()> {
        let (fails, delay) = {
            let st = self.state.lock().await;
            (st.failing.contains(&endpoint), st.delays.get(&endpoint).copied())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if fails {
            return Err(ClientError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: format!("{:?} failed", endpoint),
            });
        }
        Ok(())
    }
}

pub fn appointment(id: &str, status: AppointmentStatus) -> Appointment {
    Appointment {
        id: id.to_string(),
        patient_id: "P1".into(),
        patient_name: Some("Ana Silva".into()),
        doctor: "Dr. Costa".into(),
        date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        time_slot: "10:00".into(),
        duration: 30,
        kind: Some("cleaning".into()),
        custom_type: None,
        status,
        price: 100.0,
        payment_status: PaymentStatus::Unpaid,
        total_paid: 0.0,
    }
}

pub fn request_notification(id: &str, appointment_id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        message: "Ana Silva requested an appointment".into(),
        created_at: "2024-05-01T09:00:00Z".parse().unwrap(),
        is_read: false,
        kind: NotificationKind::Appointment(AppointmentNotice {
            appointment_id: Some(appointment_id.to_string()),
            current_status: Some(AppointmentStatus::Pending),
            is_request: true,
            patient_name: Some("Ana Silva".into()),
        }),
    }
}

pub fn message_notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        message: "Welcome to the clinic".into(),
        created_at: "2024-05-01T08:00:00Z".parse().unwrap(),
        is_read: false,
        kind: NotificationKind::Message,
    }
}

pub fn payment(id: &str, appointment_id: &str, amount: f64) -> Payment {
    Payment {
        id: id.to_string(),
        appointment_id: appointment_id.to_string(),
        patient_id: Some("P1".into()),
        amount,
        method: PaymentMethod::Cash,
        date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        transaction_id: "TXN-1700000000000-0A1B2C3D".into(),
        notes: String::new(),
    }
}
