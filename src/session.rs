//! Session/auth store and the guest ("temporary") patient session.
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::api::{ClinicApi, Credentials, Registration};
use crate::error::{ClientError, ClientResult};
use crate::model::{Role, User};
use crate::notice::{Notice, Notifier};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-]{6,18}[0-9]$").expect("valid phone regex"));

/// Holds the authenticated identity and gates portal access.
pub struct SessionStore {
    api: Arc<dyn ClinicApi>,
    notifier: Arc<dyn Notifier>,
    user: RwLock<Option<User>>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn ClinicApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            user: RwLock::new(None),
        }
    }

    pub async fn current(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    /// Ask the backend who we are and cache the answer.
    #[instrument(skip_all)]
    pub async fn verify(&self) -> ClientResult<Option<User>> {
        let user = self.api.verify().await?;
        *self.user.write().await = user.clone();
        Ok(user)
    }

    /// Log into `portal`. A valid account with a different role is logged
    /// straight back out so no half-authenticated session remains.
    #[instrument(skip_all, fields(portal = %portal, username = %username))]
    pub async fn login(&self, portal: Role, username: &str, password: &str) -> ClientResult<User> {
        if username.trim().is_empty() || password.is_empty() {
            let err = ClientError::validation("Username and password are required");
            self.notifier.notify(Notice::error(err.user_message()));
            return Err(err);
        }
        let credentials = Credentials {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        let outcome = match self.api.login(&credentials).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(?err, "login failed");
                self.notifier.notify(Notice::error(err.user_message()));
                return Err(err);
            }
        };

        if outcome.user.role != portal {
            warn!(role = %outcome.user.role, "role does not match portal; logging out");
            if let Err(err) = self.api.logout().await {
                warn!(?err, "logout after role mismatch failed");
            }
            *self.user.write().await = None;
            let err = ClientError::Unauthorized(format!(
                "Unauthorized: this account cannot access the {} portal",
                portal
            ));
            self.notifier.notify(Notice::error(err.user_message()));
            return Err(err);
        }

        info!("logged in");
        *self.user.write().await = Some(outcome.user.clone());
        Ok(outcome.user)
    }

    /// Local state is cleared even when the backend call fails.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> ClientResult<()> {
        let res = self.api.logout().await;
        *self.user.write().await = None;
        if let Err(err) = &res {
            warn!(?err, "logout request failed");
        }
        res
    }

    #[instrument(skip_all)]
    pub async fn register(&self, registration: &Registration) -> ClientResult<()> {
        if let Err(err) = validate_registration(registration) {
            self.notifier.notify(Notice::warning(err.user_message()));
            return Err(err);
        }
        match self.api.register(registration).await {
            Ok(()) => {
                self.notifier.notify(Notice::success("Registration successful"));
                Ok(())
            }
            Err(err) => {
                warn!(?err, "registration failed");
                self.notifier.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Route gate: the signed-in user must hold exactly the portal's role.
    pub async fn require(&self, portal: Role) -> ClientResult<User> {
        match self.current().await {
            Some(user) if user.role == portal => Ok(user),
            Some(user) => Err(ClientError::Unauthorized(format!(
                "{} accounts cannot access the {} portal",
                user.role, portal
            ))),
            None => Err(ClientError::Unauthorized("Please log in".into())),
        }
    }
}

pub fn validate_registration(reg: &Registration) -> ClientResult<()> {
    if reg.name.trim().is_empty() {
        return Err(ClientError::validation("Name is required"));
    }
    if !EMAIL_RE.is_match(reg.email.trim()) {
        return Err(ClientError::validation("Please enter a valid email address"));
    }
    if !PHONE_RE.is_match(reg.phone.trim()) {
        return Err(ClientError::validation("Please enter a valid phone number"));
    }
    Ok(())
}

/// Guest checkout identity kept between visits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporarySession {
    pub is_temporary_login: bool,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub login_time: DateTime<Utc>,
}

impl TemporarySession {
    pub fn new(first_name: &str, last_name: &str, email: &str, phone: &str) -> Self {
        Self {
            is_temporary_login: true,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: email.trim().to_string(),
            phone: phone.trim().to_string(),
            login_time: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.login_time >= ttl
    }
}

/// Mirrors the temporary session into two storage areas: a per-run
/// `session` area and a persistent `local` area.
#[derive(Debug, Clone)]
pub struct TemporarySessionStore {
    session_area: PathBuf,
    local_area: PathBuf,
    ttl: Duration,
}

const STORAGE_KEY: &str = "temporaryPatient.json";
const MAX_TTL_HOURS: u64 = 24 * 365;

impl TemporarySessionStore {
    pub fn new(data_dir: &Path, ttl_hours: u64) -> Self {
        Self {
            session_area: data_dir.join("session").join(STORAGE_KEY),
            local_area: data_dir.join("local").join(STORAGE_KEY),
            ttl: Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
        }
    }

    pub async fn save(&self, session: &TemporarySession) -> ClientResult<()> {
        let raw = serde_json::to_vec_pretty(session)?;
        for path in [&self.session_area, &self.local_area] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, &raw).await?;
        }
        info!(email = %session.email, "temporary session saved");
        Ok(())
    }

    pub async fn load(&self) -> ClientResult<Option<TemporarySession>> {
        self.load_at(Utc::now()).await
    }

    /// Read the session area first, then the local area. Expired or corrupt
    /// entries are removed from both.
    pub async fn load_at(&self, now: DateTime<Utc>) -> ClientResult<Option<TemporarySession>> {
        for path in [&self.session_area, &self.local_area] {
            let raw = match fs::read(path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let session: TemporarySession = match serde_json::from_slice(&raw) {
                Ok(s) => s,
                Err(err) => {
                    warn!(?err, path = %path.display(), "discarding corrupt temporary session");
                    self.clear().await?;
                    return Ok(None);
                }
            };
            if !session.is_temporary_login || session.is_expired_at(now, self.ttl) {
                info!("temporary session expired");
                self.clear().await?;
                return Ok(None);
            }
            return Ok(Some(session));
        }
        Ok(None)
    }

    pub async fn clear(&self) -> ClientResult<()> {
        for path in [&self.session_area, &self.local_area] {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// The per-run area does not outlive the process; call on shutdown.
    pub async fn end_browsing_session(&self) -> ClientResult<()> {
        match fs::remove_file(&self.session_area).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reg(name: &str, email: &str, phone: &str) -> Registration {
        Registration {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn registration_validation() {
        assert!(validate_registration(&reg("Ana", "ana@clinic.test", "+351 912 345 678")).is_ok());
        assert!(validate_registration(&reg("", "ana@clinic.test", "912345678")).is_err());
        assert!(validate_registration(&reg("Ana", "ana@clinic", "912345678")).is_err());
        assert!(validate_registration(&reg("Ana", "ana@clinic.test", "12")).is_err());
    }

    #[tokio::test]
    async fn temporary_session_written_to_both_areas() {
        let td = tempdir().unwrap();
        let store = TemporarySessionStore::new(td.path(), 24);
        let session = TemporarySession::new("Ana", "Silva", "ana@clinic.test", "912345678");
        store.save(&session).await.unwrap();
        assert!(td.path().join("session").join(STORAGE_KEY).exists());
        assert!(td.path().join("local").join(STORAGE_KEY).exists());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.full_name(), "Ana Silva");

        // Local area alone still restores the session.
        store.end_browsing_session().await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn temporary_session_expires_after_ttl() {
        let td = tempdir().unwrap();
        let store = TemporarySessionStore::new(td.path(), 24);
        let session = TemporarySession::new("Ana", "Silva", "ana@clinic.test", "912345678");
        store.save(&session).await.unwrap();

        let just_before = session.login_time + Duration::hours(23);
        assert!(store.load_at(just_before).await.unwrap().is_some());

        let after = session.login_time + Duration::hours(24);
        assert!(store.load_at(after).await.unwrap().is_none());
        assert!(!td.path().join("local").join(STORAGE_KEY).exists());
        assert!(!td.path().join("session").join(STORAGE_KEY).exists());
    }

    #[tokio::test]
    async fn corrupt_temporary_session_is_cleared() {
        let td = tempdir().unwrap();
        let store = TemporarySessionStore::new(td.path(), 24);
        std::fs::create_dir_all(td.path().join("session")).unwrap();
        std::fs::write(td.path().join("session").join(STORAGE_KEY), b"{not json").unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!td.path().join("session").join(STORAGE_KEY).exists());
    }

    #[test]
    fn temporary_session_wire_shape() {
        let session = TemporarySession::new("Ana", "Silva", "a@b.co", "912345678");
        let v = serde_json::to_value(&session).unwrap();
        assert_eq!(v["isTemporaryLogin"], true);
        assert_eq!(v["firstName"], "Ana");
        assert!(v.get("loginTime").is_some());
    }
}
