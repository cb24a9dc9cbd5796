use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::RecordId;
use crate::transport::TransportKind;

/// Noteworthy outcomes of session construction and teardown.
///
/// Collected on the [`Session`](crate::Session) and drained by the host with
/// [`Session::take_events`](crate::Session::take_events), for audit logs or
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A record was resolved and survived every guard.
    Authenticated {
        scope: String,
        record_id: RecordId,
        /// Transport that restored the session, `None` for fresh credentials.
        transport: Option<TransportKind>,
        timestamp: DateTime<Utc>,
    },

    /// A password attempt failed.
    CredentialsRejected {
        scope: String,
        login: String,
        timestamp: DateTime<Utc>,
    },

    /// A password attempt hit the failed login limit.
    LockedOut {
        scope: String,
        login: String,
        timestamp: DateTime<Utc>,
    },

    /// A persisted session outlived the inactivity window.
    Expired {
        scope: String,
        record_id: RecordId,
        timestamp: DateTime<Utc>,
    },

    /// A guard refused the resolved record.
    Vetoed {
        scope: String,
        record_id: RecordId,
        guard: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The persistence token was replaced.
    TokenRotated {
        scope: String,
        record_id: RecordId,
        timestamp: DateTime<Utc>,
    },

    /// The session was explicitly destroyed.
    Destroyed {
        scope: String,
        record_id: RecordId,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Authenticated { timestamp, .. }
            | Self::CredentialsRejected { timestamp, .. }
            | Self::LockedOut { timestamp, .. }
            | Self::Expired { timestamp, .. }
            | Self::Vetoed { timestamp, .. }
            | Self::TokenRotated { timestamp, .. }
            | Self::Destroyed { timestamp, .. } => *timestamp,
        }
    }

    pub fn scope(&self) -> &str {
        match self {
            Self::Authenticated { scope, .. }
            | Self::CredentialsRejected { scope, .. }
            | Self::LockedOut { scope, .. }
            | Self::Expired { scope, .. }
            | Self::Vetoed { scope, .. }
            | Self::TokenRotated { scope, .. }
            | Self::Destroyed { scope, .. } => scope,
        }
    }
}
