use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::{Cache, Refreshable, Snapshot};
use crate::api::{ClinicApi, PaymentRecord, PaymentScope};
use crate::error::{ClientError, ClientResult};
use crate::model::{Payment, PaymentMethod};

/// Payment records for one appointment or patient, plus the accepted methods.
pub struct PaymentStore {
    api: Arc<dyn ClinicApi>,
    scope: RwLock<Option<PaymentScope>>,
    cache: Cache<Payment>,
    methods: RwLock<Option<Vec<PaymentMethod>>>,
}

impl PaymentStore {
    pub fn new(api: Arc<dyn ClinicApi>, scope: Option<PaymentScope>) -> Self {
        Self {
            api,
            scope: RwLock::new(scope),
            cache: Cache::new(),
            methods: RwLock::new(None),
        }
    }

    pub async fn set_scope(&self, scope: Option<PaymentScope>) {
        *self.scope.write().await = scope;
        self.cache.mark_stale().await;
    }

    #[instrument(skip_all)]
    pub async fn refresh_payments(&self) -> ClientResult<()> {
        let scope = self.scope.read().await.clone();
        let res = match scope {
            Some(scope) => self.cache.refetch(|| self.api.list_payments(&scope)).await,
            // Nothing selected yet: an empty ledger is the truthful answer.
            None => self.cache.refetch(|| async { Ok(Vec::new()) }).await,
        };
        if let Err(err) = &res {
            warn!(?err, "payment refresh failed");
        }
        res
    }

    /// Methods offered by the backend; falls back to the built-in set when the
    /// endpoint is unavailable or returns nothing usable.
    pub async fn payment_methods(&self) -> Vec<PaymentMethod> {
        if let Some(methods) = self.methods.read().await.as_ref() {
            return methods.clone();
        }
        let methods = match self.api.payment_methods().await {
            Ok(methods) if !methods.is_empty() => methods,
            Ok(_) => {
                warn!("backend returned no payment methods; using defaults");
                PaymentMethod::ALL.to_vec()
            }
            Err(err) => {
                warn!(?err, "failed to load payment methods; using defaults");
                return PaymentMethod::ALL.to_vec();
            }
        };
        *self.methods.write().await = Some(methods.clone());
        methods
    }

    #[instrument(skip_all, fields(appointment_id = %record.appointment_id))]
    pub async fn record_payment(&self, record: &PaymentRecord) -> ClientResult<Payment> {
        check_record(record)?;
        let payment = match self.api.create_payment(record).await {
            Ok(p) => p,
            Err(err) => {
                warn!(?err, "record payment failed");
                return Err(err);
            }
        };
        info!(payment_id = %payment.id, amount = payment.amount, "payment recorded");
        let added = payment.clone();
        self.cache
            .patch(move |items| {
                if !items.iter().any(|p| p.id == added.id) {
                    items.push(added.clone());
                }
            })
            .await;
        Ok(payment)
    }

    #[instrument(skip_all, fields(payment_id = %id))]
    pub async fn edit_payment(&self, id: &str, record: &PaymentRecord) -> ClientResult<Payment> {
        if id.trim().is_empty() {
            return Err(ClientError::validation("No payment selected"));
        }
        check_record(record)?;
        let payment = match self.api.update_payment(id, record).await {
            Ok(p) => p,
            Err(err) => {
                warn!(?err, "edit payment failed");
                return Err(err);
            }
        };
        info!(amount = payment.amount, "payment updated");
        let updated = payment.clone();
        let id = id.to_string();
        self.cache
            .patch(move |items| {
                for p in items.iter_mut().filter(|p| p.id == id) {
                    *p = updated.clone();
                }
            })
            .await;
        Ok(payment)
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.cache.items().await
    }

    pub async fn get(&self, id: &str) -> Option<Payment> {
        self.cache.find(|p| p.id == id).await
    }

    pub async fn total_paid(&self) -> f64 {
        self.cache.items().await.iter().map(|p| p.amount).sum()
    }

    pub async fn snapshot(&self) -> Snapshot<Payment> {
        self.cache.snapshot().await
    }

    pub async fn is_loading(&self) -> bool {
        self.cache.is_loading().await
    }
}

fn check_record(record: &PaymentRecord) -> ClientResult<()> {
    if record.appointment_id.trim().is_empty() {
        return Err(ClientError::validation("An appointment must be associated with the payment"));
    }
    if !(record.amount.is_finite() && record.amount > 0.0) {
        return Err(ClientError::validation("Payment amount must be a positive number"));
    }
    Ok(())
}

#[async_trait]
impl Refreshable for PaymentStore {
    fn name(&self) -> &'static str {
        "payments"
    }

    async fn invalidate(&self) -> ClientResult<()> {
        self.cache.mark_stale().await;
        self.refresh_payments().await
    }
}
