//! Credential transports.
//!
//! A transport knows one place credentials can travel with a request: a
//! cookie, a query parameter, the server-side session or an `Authorization`
//! header. It reads what the client presented and, when it persists, writes
//! or clears the credential on the way out. Transports never decide whether
//! a credential is valid; the pipeline does.

mod cookies;
mod http_auth;
mod native_session;
mod params;

pub use cookies::CookieTransport;
pub use http_auth::HttpAuthTransport;
pub use native_session::NativeSessionTransport;
pub use params::ParamsTransport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::AuthCrypto;
use crate::identity::RecordId;
use crate::request::HostRequest;
use crate::scope::{ScopeConfig, TransportKeys};
use crate::tokens::{TokenKind, TokenSecret};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Params,
    Cookie,
    NativeSession,
    HttpAuth,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Params => "params",
            TransportKind::Cookie => "cookie",
            TransportKind::NativeSession => "native_session",
            TransportKind::HttpAuth => "http_auth",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transport `{0}`")]
pub struct UnknownTransport(pub String);

impl FromStr for TransportKind {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "params" => Ok(TransportKind::Params),
            "cookie" => Ok(TransportKind::Cookie),
            "native_session" | "session" => Ok(TransportKind::NativeSession),
            "http_auth" => Ok(TransportKind::HttpAuth),
            other => Err(UnknownTransport(other.to_string())),
        }
    }
}

/// Everything a transport needs to know about the scope it serves.
#[derive(Debug, Clone, Copy)]
pub struct TransportContext<'a> {
    pub config: &'a ScopeConfig,
    pub keys: &'a TransportKeys,
    pub crypto: &'a AuthCrypto,
    pub now: DateTime<Utc>,
}

/// A token presented by the client.
#[derive(Debug, Clone)]
pub struct PresentedToken {
    pub secret: TokenSecret,
    /// Record id carried alongside the token, checked against the token's
    /// owner when present.
    pub record_id: Option<RecordId>,
    pub remember_until: Option<DateTime<Utc>>,
    /// Token kinds this transport may carry.
    pub kinds: &'static [TokenKind],
}

impl PresentedToken {
    pub fn accepts(&self, kind: TokenKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Login and password presented directly on the request.
#[derive(Clone)]
pub struct PasswordCredentials {
    pub login: String,
    pub password: Zeroizing<String>,
}

impl PasswordCredentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Presented {
    Token(PresentedToken),
    Password(PasswordCredentials),
}

/// Credential a persisting transport writes back for the client.
#[derive(Debug, Clone, Copy)]
pub struct Persisted<'a> {
    pub token: &'a TokenSecret,
    pub record_id: &'a RecordId,
    pub remember_until: Option<DateTime<Utc>>,
}

pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Read the credential the client presented, if any. Malformed values
    /// read as absent.
    fn load(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<Presented>;

    /// Whether the transport carries the session across requests.
    fn persists(&self) -> bool {
        false
    }

    fn save(
        &self,
        _ctx: &TransportContext<'_>,
        _persisted: &Persisted<'_>,
        _request: &mut HostRequest,
    ) {
    }

    /// Clear whatever [`Transport::save`] wrote.
    fn invalidate(&self, _ctx: &TransportContext<'_>, _request: &mut HostRequest) {
    }
}

pub fn transport_for(kind: TransportKind) -> &'static dyn Transport {
    match kind {
        TransportKind::Params => &ParamsTransport,
        TransportKind::Cookie => &CookieTransport,
        TransportKind::NativeSession => &NativeSessionTransport,
        TransportKind::HttpAuth => &HttpAuthTransport,
    }
}
