use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuthFailure, PipelineResult, StageError};
use crate::events::SessionEvent;
use crate::identity::{Identity, RecordId};
use crate::request::HostRequest;
use crate::scope::{ScopeHandle, TransportKeys};
use crate::tokens::{TokenKind, TokenLedger, TokenSecret};
use crate::transport::{
    PasswordCredentials, TransportContext, TransportKind, transport_for,
};

/// Credentials supplied explicitly to
/// [`SessionPipeline::construct`](crate::SessionPipeline::construct).
pub enum Credentials<R> {
    Password(PasswordCredentials),
    /// Authenticate this record directly, skipping transports and the
    /// password check.
    Record(R),
}

impl<R: Identity> fmt::Debug for Credentials<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(credentials) => {
                f.debug_tuple("Password").field(credentials).finish()
            }
            Credentials::Record(record) => {
                f.debug_tuple("Record").field(&record.id()).finish()
            }
        }
    }
}

/// Arguments for one session construction.
pub struct InitArgs<R> {
    pub(crate) credentials: Option<Credentials<R>>,
    pub(crate) id: Option<String>,
    pub(crate) remember_me: Option<bool>,
}

impl<R> InitArgs<R> {
    /// Restore a session from whatever the transports carry.
    pub fn none() -> Self {
        Self {
            credentials: None,
            id: None,
            remember_me: None,
        }
    }

    pub fn password(
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            credentials: Some(Credentials::Password(PasswordCredentials::new(
                login, password,
            ))),
            ..Self::none()
        }
    }

    /// Log `record` in without a password, e.g. right after sign-up.
    pub fn record(record: R) -> Self {
        Self {
            credentials: Some(Credentials::Record(record)),
            ..Self::none()
        }
    }

    /// Namespace every transport key with `id`, so several sessions of the
    /// same scope can live side by side.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the scope's remember-me default for this login.
    #[must_use]
    pub fn remember_me(mut self, remember: bool) -> Self {
        self.remember_me = Some(remember);
        self
    }
}

impl<R> Default for InitArgs<R> {
    fn default() -> Self {
        Self::none()
    }
}

impl<R: Identity> fmt::Debug for InitArgs<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitArgs")
            .field("credentials", &self.credentials)
            .field("id", &self.id)
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// How the session's record was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Password,
    PriorityRecord,
    /// Basic credentials from the `Authorization` header.
    HttpAuth,
    /// A token carried by a transport.
    Token {
        transport: TransportKind,
        kind: TokenKind,
    },
}

impl Resolution {
    /// Fresh credentials, as opposed to a restored session.
    pub fn is_login(self) -> bool {
        matches!(
            self,
            Resolution::Password
                | Resolution::PriorityRecord
                | Resolution::HttpAuth
                | Resolution::Token {
                    kind: TokenKind::Perishable,
                    ..
                }
        )
    }

    /// Whether the outcome is written back to persisting transports.
    pub fn is_stateless(self) -> bool {
        matches!(
            self,
            Resolution::HttpAuth
                | Resolution::Token {
                    kind: TokenKind::SingleAccess,
                    ..
                }
        )
    }

    pub fn transport(self) -> Option<TransportKind> {
        match self {
            Resolution::Token { transport, .. } => Some(transport),
            Resolution::HttpAuth => Some(TransportKind::HttpAuth),
            Resolution::Password | Resolution::PriorityRecord => None,
        }
    }
}

/// Authentication state of one request within one scope.
///
/// `record` is present exactly when some stage resolved an identity and no
/// guard vetoed it. Everything in `errors` is diagnostic.
pub struct Session<R> {
    pub(crate) scope: String,
    pub(crate) record_name: String,
    pub(crate) id: Option<String>,
    pub(crate) instance: u64,
    pub(crate) active: bool,
    pub(crate) record: Option<R>,
    pub(crate) credentials: Option<Credentials<R>>,
    pub(crate) errors: Vec<StageError>,
    pub(crate) resolution: Option<Resolution>,
    pub(crate) last_activity: Option<DateTime<Utc>>,
    pub(crate) persistence_token: Option<TokenSecret>,
    pub(crate) persistence_digest: Option<String>,
    pub(crate) remember_me: bool,
    pub(crate) remember_until: Option<DateTime<Utc>>,
    pub(crate) challenge: Option<String>,
    pub(crate) events: Vec<SessionEvent>,
    pub(crate) keys: TransportKeys,
    handle: Arc<ScopeHandle>,
    ledger: TokenLedger,
}

impl<R: Identity> Session<R> {
    pub(crate) fn new(
        handle: Arc<ScopeHandle>,
        ledger: TokenLedger,
        instance: u64,
        keys: TransportKeys,
    ) -> Self {
        let config = handle.config();
        Self {
            scope: config.name.clone(),
            record_name: config.record_name.clone(),
            id: None,
            instance,
            active: handle.is_active(),
            record: None,
            credentials: None,
            errors: Vec::new(),
            resolution: None,
            last_activity: None,
            persistence_token: None,
            persistence_digest: None,
            remember_me: config.cookie.remember_me,
            remember_until: None,
            challenge: None,
            events: Vec::new(),
            keys,
            handle,
            ledger,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Name hosts expose the record under (`current_user`, `current_admin`).
    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Per-scope instance number, starting at 1.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_authenticated(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<&R> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<R> {
        self.record
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record.as_ref().map(Identity::id)
    }

    /// Every collected error, in the order stages produced them.
    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    pub fn has_error(&self, failure: &AuthFailure) -> bool {
        self.errors.iter().any(|error| &error.failure == failure)
    }

    /// Messages suitable for the end user. Expired sessions are omitted.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|error| error.failure.is_user_facing())
            .map(|error| error.failure.to_string())
            .collect()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Nothing was persisted for this session.
    pub fn is_stateless(&self) -> bool {
        self.resolution.is_some_and(Resolution::is_stateless)
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Token written to the persisting transports.
    pub fn persistence_token(&self) -> Option<&TokenSecret> {
        self.persistence_token.as_ref()
    }

    pub fn is_remembered(&self) -> bool {
        self.remember_until.is_some()
    }

    pub fn remember_until(&self) -> Option<DateTime<Utc>> {
        self.remember_until
    }

    /// `WWW-Authenticate` value the host should send, if basic
    /// authentication was requested.
    pub fn http_auth_challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    pub fn keys(&self) -> &TransportKeys {
        &self.keys
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Log out: revoke the persistence token, clear every enabled transport
    /// of this scope and drop the record. Safe to call repeatedly.
    pub fn destroy(&mut self, request: &mut HostRequest) -> PipelineResult<()> {
        if let Some(token) = self.persistence_token.take() {
            self.ledger.revoke(&token)?;
        }
        self.persistence_digest = None;

        let config = self.handle.config();
        let ctx = TransportContext {
            config,
            keys: &self.keys,
            crypto: self.ledger.crypto(),
            now: self.ledger.now(),
        };
        for kind in &config.transports {
            transport_for(*kind).invalidate(&ctx, request);
        }

        self.credentials = None;
        self.remember_until = None;
        self.challenge = None;
        if let Some(record) = self.record.take() {
            let record_id = record.id();
            info!(scope = %self.scope, record_id = %record_id, "session destroyed");
            self.events.push(SessionEvent::Destroyed {
                scope: self.scope.clone(),
                record_id,
                timestamp: ctx.now,
            });
        } else {
            debug!(scope = %self.scope, "destroyed unauthenticated session");
        }
        self.resolution = None;
        Ok(())
    }

    pub(crate) fn push_error(&mut self, error: StageError) {
        debug!(
            scope = %self.scope,
            stage = %error.stage,
            failure = %error.failure,
            "session stage error"
        );
        self.errors.push(error);
    }
}

impl<R: Identity> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("scope", &self.scope)
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("record_id", &self.record_id())
            .field("errors", &self.errors)
            .field("resolution", &self.resolution)
            .field("persistence_token", &self.persistence_token)
            .field("remember_until", &self.remember_until)
            .finish_non_exhaustive()
    }
}
