use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::model::{Appointment, Notification, Payment, PaymentMethod, User};

pub mod model;

pub use model::{
    AppointmentPatch, AppointmentScope, Credentials, PaymentRecord, PaymentScope, Registration,
};
use model::{Envelope, LoginResp, PaymentMethodEntry, ReadFlag, VerifyResp};

pub const DEFAULT_API_BASE: &str = "http://localhost:3001/api/";

/// Result of a successful `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: User,
    pub token: Option<String>,
}

/// Every backend call the portal makes. The REST client implements it; tests
/// substitute in-memory fakes.
#[async_trait]
pub trait ClinicApi: Send + Sync {
    /// `Ok(None)` when there is no valid session.
    async fn verify(&self) -> ClientResult<Option<User>>;
    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginOutcome>;
    async fn logout(&self) -> ClientResult<()>;
    async fn register(&self, registration: &Registration) -> ClientResult<()>;

    async fn list_appointments(&self, scope: &AppointmentScope) -> ClientResult<Vec<Appointment>>;
    async fn update_appointment(&self, id: &str, patch: &AppointmentPatch) -> ClientResult<()>;

    async fn list_notifications(&self, user_id: &str) -> ClientResult<Vec<Notification>>;
    async fn set_notification_read(&self, id: &str, is_read: bool) -> ClientResult<()>;
    async fn delete_notification(&self, id: &str) -> ClientResult<()>;
    async fn mark_all_notifications_read(&self, user_id: &str) -> ClientResult<()>;

    async fn payment_methods(&self) -> ClientResult<Vec<PaymentMethod>>;
    async fn list_payments(&self, scope: &PaymentScope) -> ClientResult<Vec<Payment>>;
    async fn create_payment(&self, record: &PaymentRecord) -> ClientResult<Payment>;
    async fn update_payment(&self, id: &str, record: &PaymentRecord) -> ClientResult<Payment>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url, user_agent: &str) -> ClientResult<Self> {
        // Session is cookie based; the bearer token is only sent when login returned one.
        let http = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(cfg: &Config) -> ClientResult<Self> {
        let base_url = cfg
            .api
            .url()
            .map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        Self::new(base_url, &cfg.api.user_agent)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {}", path, err)))
    }

    fn bearer(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set_bearer(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = token;
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ClientResult<reqwest::Request> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let mut builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = self.bearer() {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Execute and return the raw body of a 2xx response.
    async fn execute(&self, request: reqwest::Request) -> ClientResult<String> {
        debug!(method = %request.method(), url = %request.url(), "api request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<IgnoredAny>>(&body)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            warn!(%status, %message, "api error response");
            return Err(ClientError::Status { status, message });
        }
        Ok(body)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ClientResult<Envelope<T>> {
        let request = self.build_request(method, path, query, body)?;
        let raw = self.execute(request).await?;
        let envelope: Envelope<T> = if raw.trim().is_empty() {
            Envelope {
                success: None,
                data: None,
                message: None,
            }
        } else {
            serde_json::from_str(&raw)?
        };
        if envelope.success == Some(false) {
            return Err(ClientError::Rejected(envelope.message.unwrap_or_default()));
        }
        Ok(envelope)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let envelope = self.call::<T>(Method::GET, path, query, None).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Rejected(format!("response to {} carried no data", path)))
    }

    async fn send_ack<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> ClientResult<()> {
        let body = body.map(serde_json::to_value).transpose()?;
        self.call::<IgnoredAny>(method, path, query, body.as_ref())
            .await
            .map(|_| ())
    }

    async fn send_payment(
        &self,
        method: Method,
        path: &str,
        record: &PaymentRecord,
    ) -> ClientResult<Payment> {
        let body = serde_json::to_value(record)?;
        self.call::<Payment>(method, path, &[], Some(&body))
            .await?
            .data
            .ok_or_else(|| ClientError::Rejected("payment response carried no record".into()))
    }
}

#[async_trait]
impl ClinicApi for ApiClient {
    async fn verify(&self) -> ClientResult<Option<User>> {
        let request = self.build_request(Method::GET, "auth/verify", &[], None)?;
        match self.execute(request).await {
            Ok(raw) => {
                let resp: VerifyResp = serde_json::from_str(&raw)?;
                if resp.success == Some(false) {
                    return Ok(None);
                }
                Ok(resp.user)
            }
            Err(err) if err.is_unauthorized() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginOutcome> {
        let body = serde_json::to_value(credentials)?;
        let request = self.build_request(Method::POST, "auth/login", &[], Some(&body))?;
        let raw = self.execute(request).await?;
        let resp: LoginResp = serde_json::from_str(&raw)?;
        if resp.success == Some(false) {
            return Err(ClientError::Rejected(
                resp.message.unwrap_or_else(|| "Login failed".into()),
            ));
        }
        let user = resp
            .user
            .ok_or_else(|| ClientError::Rejected("login response carried no user".into()))?;
        self.set_bearer(resp.token.clone());
        Ok(LoginOutcome {
            user,
            token: resp.token,
        })
    }

    async fn logout(&self) -> ClientResult<()> {
        let res = self
            .send_ack::<Value>(Method::POST, "auth/logout", &[], None)
            .await;
        self.set_bearer(None);
        res
    }

    async fn register(&self, registration: &Registration) -> ClientResult<()> {
        self.send_ack(Method::POST, "auth/register", &[], Some(registration))
            .await
    }

    async fn list_appointments(&self, scope: &AppointmentScope) -> ClientResult<Vec<Appointment>> {
        self.fetch("appointments", &scope.query()).await
    }

    async fn update_appointment(&self, id: &str, patch: &AppointmentPatch) -> ClientResult<()> {
        self.send_ack(Method::PATCH, &format!("appointments/{}", id), &[], Some(patch))
            .await
    }

    async fn list_notifications(&self, user_id: &str) -> ClientResult<Vec<Notification>> {
        self.fetch("notifications", &[("userId", user_id.to_string())])
            .await
    }

    async fn set_notification_read(&self, id: &str, is_read: bool) -> ClientResult<()> {
        self.send_ack(
            Method::PUT,
            &format!("notifications/{}", id),
            &[],
            Some(&ReadFlag { is_read }),
        )
        .await
    }

    async fn delete_notification(&self, id: &str) -> ClientResult<()> {
        self.send_ack::<Value>(Method::DELETE, &format!("notifications/{}", id), &[], None)
            .await
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> ClientResult<()> {
        self.send_ack::<Value>(
            Method::PUT,
            "notifications/mark-all-read",
            &[("userId", user_id.to_string())],
            None,
        )
        .await
    }

    async fn payment_methods(&self) -> ClientResult<Vec<PaymentMethod>> {
        let entries: Vec<PaymentMethodEntry> = self.fetch("payment-methods", &[]).await?;
        let mut methods = Vec::new();
        for entry in &entries {
            match entry.name().parse::<PaymentMethod>() {
                Ok(m) if !methods.contains(&m) => methods.push(m),
                Ok(_) => {}
                Err(err) => debug!(%err, "skipping payment method"),
            }
        }
        Ok(methods)
    }

    async fn list_payments(&self, scope: &PaymentScope) -> ClientResult<Vec<Payment>> {
        self.fetch("payments", &scope.query()).await
    }

    async fn create_payment(&self, record: &PaymentRecord) -> ClientResult<Payment> {
        self.send_payment(Method::POST, "payments", record).await
    }

    async fn update_payment(&self, id: &str, record: &PaymentRecord) -> ClientResult<Payment> {
        self.send_payment(Method::PUT, &format!("payments/{}", id), record)
            .await
    }
}
