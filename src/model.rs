use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Tentative,
    Confirmed,
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Tentative,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Tentative => "tentative",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses that close a request for UI purposes: request action buttons
    /// are disabled once an appointment reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Confirmed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Completed
                | AppointmentStatus::Scheduled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        // Backend and UI use both spellings.
        let wanted = if wanted == "canceled" { "cancelled".to_string() } else { wanted };
        AppointmentStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| format!("unknown appointment status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Refunded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "patient")]
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Doctor display name; the client does not treat it as a foreign key.
    pub doctor: String,
    #[serde(deserialize_with = "calendar_day")]
    pub date: NaiveDate,
    #[serde(alias = "time")]
    pub time_slot: String,
    /// Minutes.
    #[serde(default)]
    pub duration: u32,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub custom_type: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub total_paid: f64,
}

impl Appointment {
    /// `price - total_paid`. `total_paid <= price` is expected but not enforced here.
    pub fn outstanding_balance(&self) -> f64 {
        self.price - self.total_paid
    }

    /// Label shown for the appointment type; custom labels win over the generic "other".
    pub fn type_label(&self) -> &str {
        match (self.kind.as_deref(), self.custom_type.as_deref()) {
            (_, Some(custom)) if !custom.trim().is_empty() => custom,
            (Some(kind), _) => kind,
            (None, None) | (None, Some(_)) => "General",
        }
    }
}

/// Accept both `YYYY-MM-DD` and full RFC 3339 timestamps, keeping the calendar day.
fn calendar_day<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let day = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    #[serde(rename = "Credit Card")]
    CreditCard,
    #[serde(rename = "Cash")]
    Cash,
    #[serde(rename = "Debit Card")]
    DebitCard,
    #[serde(rename = "Insurance")]
    Insurance,
    #[serde(rename = "Check")]
    Check,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::CreditCard,
        PaymentMethod::Cash,
        PaymentMethod::DebitCard,
        PaymentMethod::Insurance,
        PaymentMethod::Check,
        PaymentMethod::BankTransfer,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::Cash => "Cash",
            PaymentMethod::DebitCard => "Debit Card",
            PaymentMethod::Insurance => "Insurance",
            PaymentMethod::Check => "Check",
            PaymentMethod::BankTransfer => "Bank Transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], " ").to_ascii_lowercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown payment method '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(alias = "_id")]
    pub id: String,
    pub appointment_id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(deserialize_with = "calendar_day")]
    pub date: NaiveDate,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown portal '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Notification with its metadata resolved into a per-type variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNotification", into = "RawNotification")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    Appointment(AppointmentNotice),
    Payment { appointment_id: Option<String> },
    Message,
    System,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppointmentNotice {
    pub appointment_id: Option<String>,
    pub current_status: Option<AppointmentStatus>,
    pub is_request: bool,
    pub patient_name: Option<String>,
}

impl Notification {
    /// The appointment request this notification asks staff to act on, if any.
    pub fn appointment_request(&self) -> Option<(&str, &AppointmentNotice)> {
        match &self.kind {
            NotificationKind::Appointment(notice) if notice.is_request => notice
                .appointment_id
                .as_deref()
                .map(|id| (id, notice)),
            NotificationKind::Appointment(_)
            | NotificationKind::Payment { .. }
            | NotificationKind::Message
            | NotificationKind::System => None,
        }
    }

    pub fn appointment_id(&self) -> Option<&str> {
        match &self.kind {
            NotificationKind::Appointment(notice) => notice.appointment_id.as_deref(),
            NotificationKind::Payment { appointment_id } => appointment_id.as_deref(),
            NotificationKind::Message | NotificationKind::System => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    #[serde(alias = "_id")]
    id: String,
    #[serde(rename = "type")]
    kind: RawKind,
    message: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<RawMetadata>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawKind {
    Appointment,
    Payment,
    Message,
    #[serde(other)]
    System,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    appointment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_request: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_name: Option<String>,
}

impl From<RawNotification> for Notification {
    fn from(raw: RawNotification) -> Self {
        let meta = raw.metadata.unwrap_or_default();
        let kind = match raw.kind {
            RawKind::Appointment => NotificationKind::Appointment(AppointmentNotice {
                appointment_id: meta.appointment_id,
                current_status: meta.current_status,
                is_request: meta.is_request.unwrap_or(false),
                patient_name: meta.patient_name,
            }),
            RawKind::Payment => NotificationKind::Payment {
                appointment_id: meta.appointment_id,
            },
            RawKind::Message => NotificationKind::Message,
            RawKind::System => NotificationKind::System,
        };
        Notification {
            id: raw.id,
            message: raw.message,
            created_at: raw.created_at,
            is_read: raw.is_read,
            kind,
        }
    }
}

impl From<Notification> for RawNotification {
    fn from(n: Notification) -> Self {
        let (kind, metadata) = match n.kind {
            NotificationKind::Appointment(notice) => (
                RawKind::Appointment,
                Some(RawMetadata {
                    appointment_id: notice.appointment_id,
                    current_status: notice.current_status,
                    is_request: Some(notice.is_request),
                    patient_name: notice.patient_name,
                }),
            ),
            NotificationKind::Payment { appointment_id } => (
                RawKind::Payment,
                appointment_id.map(|id| RawMetadata {
                    appointment_id: Some(id),
                    ..Default::default()
                }),
            ),
            NotificationKind::Message => (RawKind::Message, None),
            NotificationKind::System => (RawKind::System, None),
        };
        RawNotification {
            id: n.id,
            kind,
            message: n.message,
            created_at: n.created_at,
            is_read: n.is_read,
            metadata,
        }
    }
}
