//! Record-payment / edit-payment modal logic.
//!
//! One modal state serves both flows: it opens in edit mode when an existing
//! payment was loaded into it and in create mode otherwise.
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::PaymentRecord;
use crate::error::{ClientError, ClientResult};
use crate::model::{Appointment, Payment, PaymentMethod};
use crate::notice::{Notice, Notifier};
use crate::store::{PaymentStore, Refreshable};

// Amounts are entered in currency units; half a cent absorbs float noise.
const CENT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentMode {
    Create,
    Edit {
        payment_id: String,
        original_amount: f64,
    },
}

/// Editable form fields. `amount` is kept as typed so partial input survives.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDraft {
    pub amount: String,
    pub method: Option<PaymentMethod>,
    pub date: NaiveDate,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct PaymentModal {
    mode: PaymentMode,
    appointment: Option<Appointment>,
    transaction_id: String,
    open: bool,
    methods: Vec<PaymentMethod>,
    pub draft: PaymentDraft,
}

pub fn generate_transaction_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TXN-{}-{}", Utc::now().timestamp_millis(), hex[..8].to_uppercase())
}

impl PaymentModal {
    pub fn open(appointment: Option<Appointment>, existing: Option<&Payment>) -> Self {
        match existing {
            None => Self {
                mode: PaymentMode::Create,
                appointment,
                transaction_id: generate_transaction_id(),
                open: true,
                methods: PaymentMethod::ALL.to_vec(),
                draft: PaymentDraft {
                    amount: String::new(),
                    method: None,
                    date: Utc::now().date_naive(),
                    notes: String::new(),
                },
            },
            Some(payment) => Self {
                mode: PaymentMode::Edit {
                    payment_id: payment.id.clone(),
                    original_amount: payment.amount,
                },
                appointment,
                transaction_id: payment.transaction_id.clone(),
                open: true,
                methods: PaymentMethod::ALL.to_vec(),
                draft: PaymentDraft {
                    amount: format!("{:.2}", payment.amount),
                    method: Some(payment.method),
                    date: payment.date,
                    notes: payment.notes.clone(),
                },
            },
        }
    }

    pub fn mode(&self) -> &PaymentMode {
        &self.mode
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.mode, PaymentMode::Edit { .. })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Methods the backend currently accepts; the selection must be one of them.
    pub fn set_methods(&mut self, methods: Vec<PaymentMethod>) {
        self.methods = methods;
    }

    pub fn methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn appointment(&self) -> Option<&Appointment> {
        self.appointment.as_ref()
    }

    pub fn outstanding_balance(&self) -> Option<f64> {
        self.appointment.as_ref().map(Appointment::outstanding_balance)
    }

    /// Largest amount this submission may carry. When editing, the payment
    /// being replaced is already part of `total_paid`.
    pub fn max_amount(&self) -> Option<f64> {
        let outstanding = self.outstanding_balance()?;
        Some(match &self.mode {
            PaymentMode::Create => outstanding,
            PaymentMode::Edit { original_amount, .. } => outstanding + original_amount,
        })
    }

    /// "Pay in full": fill the amount field with the whole remaining balance.
    pub fn pay_in_full(&mut self) {
        if let Some(max) = self.max_amount() {
            self.draft.amount = format!("{:.2}", max.max(0.0));
        }
    }

    fn parsed_amount(&self) -> Option<f64> {
        self.draft
            .amount
            .trim()
            .trim_start_matches('$')
            .parse::<f64>()
            .ok()
            .filter(|a| a.is_finite())
    }

    /// Inline warning shown while typing; also blocks submission.
    pub fn amount_warning(&self) -> Option<String> {
        let amount = self.parsed_amount()?;
        let max = self.max_amount()?;
        if amount > max + CENT_TOLERANCE {
            Some(format!(
                "Payment amount cannot exceed the outstanding balance of ${:.2}",
                max.max(0.0)
            ))
        } else {
            None
        }
    }

    /// Check the form and build the request body.
    pub fn validate(&self) -> ClientResult<PaymentRecord> {
        let method = self
            .draft
            .method
            .ok_or_else(|| ClientError::validation("Please select a payment method"))?;
        if !self.methods.contains(&method) {
            return Err(ClientError::Validation(format!(
                "Payment method {} is not accepted",
                method
            )));
        }
        let appointment = self.appointment.as_ref().ok_or_else(|| {
            ClientError::validation("An appointment must be associated with the payment")
        })?;
        // Compare in cents so "0.004" is rejected rather than sent as 0.00.
        let amount = match self.parsed_amount().map(|a| (a * 100.0).round() / 100.0) {
            Some(a) if a > 0.0 => a,
            _ => {
                return Err(ClientError::validation(
                    "Please enter a valid payment amount greater than zero",
                ))
            }
        };
        if let Some(warning) = self.amount_warning() {
            return Err(ClientError::Validation(warning));
        }
        Ok(PaymentRecord {
            appointment_id: appointment.id.clone(),
            amount,
            method,
            date: self.draft.date,
            transaction_id: self.transaction_id.clone(),
            notes: self.draft.notes.trim().to_string(),
        })
    }

    /// Validate, post or put the record, refresh the surrounding views and
    /// close. On any failure the modal stays open with its draft intact.
    #[instrument(skip_all, fields(edit = self.is_edit()))]
    pub async fn submit(
        &mut self,
        payments: &PaymentStore,
        refresh: &[&dyn Refreshable],
        notifier: &dyn Notifier,
    ) -> ClientResult<Payment> {
        self.methods = payments.payment_methods().await;
        let record = match self.validate() {
            Ok(record) => record,
            Err(err) => {
                notifier.notify(Notice::warning(err.user_message()));
                return Err(err);
            }
        };

        let (res, done) = match &self.mode {
            PaymentMode::Create => (
                payments.record_payment(&record).await,
                "Payment recorded successfully",
            ),
            PaymentMode::Edit { payment_id, .. } => (
                payments.edit_payment(payment_id, &record).await,
                "Payment updated successfully",
            ),
        };
        let payment = match res {
            Ok(p) => p,
            Err(err) => {
                notifier.notify(Notice::error(format!(
                    "Failed to save payment: {}",
                    err.user_message()
                )));
                return Err(err);
            }
        };
        notifier.notify(Notice::success(done));

        for target in refresh {
            if let Err(err) = target.invalidate().await {
                warn!(?err, store = target.name(), "refresh after payment failed");
            }
        }
        info!(payment_id = %payment.id, "payment saved");
        self.close();
        Ok(payment)
    }
}
