//! Narrow interface to the identity record store.
//!
//! The pipeline never reads or writes record fields directly. It resolves
//! records through [`RecordAccessor`] and asks the record about itself through
//! [`Identity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Opaque identifier of an identity record.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Boolean account states a record may carry.
///
/// A record that has no notion of a given state answers `None` from
/// [`Identity::magic_state`] and is never vetoed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagicState {
    Active,
    Approved,
    Confirmed,
}

impl MagicState {
    pub fn as_str(self) -> &'static str {
        match self {
            MagicState::Active => "active",
            MagicState::Approved => "approved",
            MagicState::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for MagicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved identity record as seen by the pipeline.
pub trait Identity: Send + Sync + 'static {
    fn id(&self) -> RecordId;

    /// Credential key used for password logins (username, email, ...).
    fn login(&self) -> &str;

    fn magic_state(&self, _state: MagicState) -> Option<bool> {
        None
    }

    /// Last recorded request time, used to throttle activity updates.
    fn last_request_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// What happened to a record during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Fresh credentials were accepted.
    Login,
    /// A persisted session was restored.
    Request,
    /// A password attempt against this record failed.
    FailedLogin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub at: DateTime<Utc>,
    pub remote_ip: Option<IpAddr>,
}

/// Consumer-provided identity record store.
///
/// Implementations are called synchronously from inside the pipeline. Errors
/// are infrastructure failures and abort construction; "not found" is
/// `Ok(None)`.
pub trait RecordAccessor<R>: Send + Sync {
    fn find_by_id(&self, id: &RecordId) -> anyhow::Result<Option<R>>;

    fn find_by_login(&self, login: &str) -> anyhow::Result<Option<R>>;

    /// Check `plaintext` against the record's stored credential. Hashing and
    /// the constant-time comparison belong to the implementation.
    fn verify_password(&self, record: &R, plaintext: &str)
    -> anyhow::Result<bool>;

    /// Maintain activity columns (login counts, timestamps, addresses).
    fn record_activity(
        &self,
        _record: &R,
        _activity: &Activity,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
