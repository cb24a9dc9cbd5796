//! In-memory identity records, for tests, demos and small deployments.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::crypto::{AuthCrypto, AuthCryptoError};
use crate::identity::{
    Activity, ActivityKind, Identity, MagicState, RecordAccessor, RecordId,
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("login `{0}` is already taken")]
    DuplicateLogin(String),

    #[error("login must not be blank")]
    BlankLogin,

    #[error("no record with id {0}")]
    UnknownRecord(RecordId),

    #[error(transparent)]
    Crypto(#[from] AuthCryptoError),
}

/// A user record with the usual magic state and activity columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUser {
    pub id: RecordId,
    pub login: String,
    pub password_hash: String,
    pub active: bool,
    pub approved: bool,
    pub confirmed: bool,
    pub login_count: u64,
    pub failed_login_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub current_login_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub current_login_ip: Option<IpAddr>,
    pub last_login_ip: Option<IpAddr>,
}

impl MemoryUser {
    fn apply(&mut self, activity: &Activity) {
        match activity.kind {
            ActivityKind::Login => {
                self.login_count += 1;
                self.failed_login_count = 0;
                self.last_login_at = self.current_login_at.replace(activity.at);
                self.last_login_ip =
                    std::mem::replace(&mut self.current_login_ip, activity.remote_ip);
                self.last_request_at = Some(activity.at);
            }
            ActivityKind::Request => {
                self.last_request_at = Some(activity.at);
            }
            ActivityKind::FailedLogin => {
                self.failed_login_count += 1;
            }
        }
    }
}

impl Identity for MemoryUser {
    fn id(&self) -> RecordId {
        self.id.clone()
    }

    fn login(&self) -> &str {
        &self.login
    }

    fn magic_state(&self, state: MagicState) -> Option<bool> {
        Some(match state {
            MagicState::Active => self.active,
            MagicState::Approved => self.approved,
            MagicState::Confirmed => self.confirmed,
        })
    }

    fn last_request_at(&self) -> Option<DateTime<Utc>> {
        self.last_request_at
    }
}

/// [`RecordAccessor`] over a map of [`MemoryUser`]s with sequential ids.
/// Logins are unique and compare case-insensitively.
#[derive(Debug)]
pub struct MemoryUserStore {
    crypto: Arc<AuthCrypto>,
    users: RwLock<HashMap<RecordId, MemoryUser>>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    pub fn new(crypto: Arc<AuthCrypto>) -> Self {
        Self {
            crypto,
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create an active, approved and confirmed user.
    pub fn insert_user(
        &self,
        login: &str,
        password: &str,
    ) -> Result<MemoryUser, MemoryStoreError> {
        let login = login.trim();
        if login.is_empty() {
            return Err(MemoryStoreError::BlankLogin);
        }
        let password_hash = self.crypto.hash_password(password)?;

        let mut users = self.users.write();
        if users
            .values()
            .any(|user| user.login.eq_ignore_ascii_case(login))
        {
            return Err(MemoryStoreError::DuplicateLogin(login.to_string()));
        }

        let id = RecordId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let user = MemoryUser {
            id: id.clone(),
            login: login.to_string(),
            password_hash,
            active: true,
            approved: true,
            confirmed: true,
            login_count: 0,
            failed_login_count: 0,
            last_request_at: None,
            current_login_at: None,
            last_login_at: None,
            current_login_ip: None,
            last_login_ip: None,
        };
        users.insert(id.clone(), user.clone());
        debug!(record_id = %id, login, "inserted user");
        Ok(user)
    }

    pub fn set_state(
        &self,
        id: &RecordId,
        state: MagicState,
        value: bool,
    ) -> Result<(), MemoryStoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(id)
            .ok_or_else(|| MemoryStoreError::UnknownRecord(id.clone()))?;
        match state {
            MagicState::Active => user.active = value,
            MagicState::Approved => user.approved = value,
            MagicState::Confirmed => user.confirmed = value,
        }
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Option<MemoryUser> {
        self.users.read().get(id).cloned()
    }

    pub fn remove(&self, id: &RecordId) -> Option<MemoryUser> {
        self.users.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl RecordAccessor<MemoryUser> for MemoryUserStore {
    fn find_by_id(&self, id: &RecordId) -> anyhow::Result<Option<MemoryUser>> {
        Ok(self.get(id))
    }

    fn find_by_login(&self, login: &str) -> anyhow::Result<Option<MemoryUser>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.login.eq_ignore_ascii_case(login))
            .cloned())
    }

    fn verify_password(
        &self,
        record: &MemoryUser,
        plaintext: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .crypto
            .verify_password(plaintext, &record.password_hash)?)
    }

    fn record_activity(
        &self,
        record: &MemoryUser,
        activity: &Activity,
    ) -> anyhow::Result<()> {
        if let Some(user) = self.users.write().get_mut(&record.id) {
            user.apply(activity);
        }
        Ok(())
    }
}
