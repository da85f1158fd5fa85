use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{AppointmentStatus, PaymentMethod, User};

/// `{success, data?, message?}` wrapper used by every backend response.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct VerifyResp {
    #[serde(default)]
    pub success: Option<bool>,
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginResp {
    #[serde(default)]
    pub success: Option<bool>,
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Which slice of appointments a store mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentScope {
    All,
    Patient(String),
    Doctor {
        doctor: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl AppointmentScope {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            AppointmentScope::All => Vec::new(),
            AppointmentScope::Patient(id) => vec![("patientId", id.clone())],
            AppointmentScope::Doctor { doctor, start, end } => vec![
                ("doctor", doctor.clone()),
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("endDate", end.format("%Y-%m-%d").to_string()),
            ],
        }
    }
}

/// Partial appointment update; only populated fields are sent.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentScope {
    Appointment(String),
    Patient(String),
}

impl PaymentScope {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            PaymentScope::Appointment(id) => vec![("appointmentId", id.clone())],
            PaymentScope::Patient(id) => vec![("patientId", id.clone())],
        }
    }
}

/// Body of `POST /payments` and `PUT /payments/:id`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub appointment_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: NaiveDate,
    pub transaction_id: String,
    pub notes: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReadFlag {
    pub is_read: bool,
}

/// `GET /payment-methods` entries come either as bare labels or as objects.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum PaymentMethodEntry {
    Label(String),
    Named { name: String },
}

impl PaymentMethodEntry {
    pub fn name(&self) -> &str {
        match self {
            PaymentMethodEntry::Label(s) => s,
            PaymentMethodEntry::Named { name } => name,
        }
    }
}
