use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

use crate::brute_force::{AttemptCounter, MemoryAttemptCounter};
use crate::clock::{Clock, SystemClock};
use crate::crypto::AuthCrypto;
use crate::error::{PipelineError, PipelineResult};
use crate::events::SessionEvent;
use crate::identity::{Identity, RecordAccessor, RecordId};
use crate::request::HostRequest;
use crate::scope::ScopeRegistry;
use crate::session::{InitArgs, Session};
use crate::stages::{Flow, Guard, Stage, StageContext, default_stages};
use crate::tokens::{
    Lifetime, MemoryTokenStore, PerishableTokens, TokenKind, TokenLedger, TokenSecret,
    TokenStore,
};
use crate::transport::{HttpAuthTransport, TransportKind};

/// Collaborators shared by every construction.
pub(crate) struct PipelineInner<R> {
    pub(crate) registry: Arc<ScopeRegistry>,
    pub(crate) accessor: Arc<dyn RecordAccessor<R>>,
    pub(crate) ledger: TokenLedger,
    pub(crate) attempts: Arc<dyn AttemptCounter>,
    guards: HashMap<String, Vec<Arc<dyn Guard<R>>>>,
    stages: Vec<Box<dyn Stage<R>>>,
    perishable: PerishableTokens,
}

impl<R> PipelineInner<R> {
    pub(crate) fn guards_for(&self, scope: &str) -> &[Arc<dyn Guard<R>>] {
        self.guards.get(scope).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Resolves, validates and persists sessions.
///
/// Cheap to clone. Construction is synchronous; async hosts should run each
/// [`construct`](Self::construct) call as a single blocking unit.
pub struct SessionPipeline<R> {
    inner: Arc<PipelineInner<R>>,
}

impl<R> Clone for SessionPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for SessionPipeline<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPipeline")
            .field("scopes", &self.inner.registry.scope_names())
            .field("token_store", &self.inner.ledger)
            .field("attempts", &self.inner.attempts)
            .field(
                "stages",
                &self
                    .inner
                    .stages
                    .iter()
                    .map(|stage| stage.name())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<R: Identity> SessionPipeline<R> {
    pub fn builder(
        registry: Arc<ScopeRegistry>,
        accessor: Arc<dyn RecordAccessor<R>>,
        crypto: Arc<AuthCrypto>,
    ) -> SessionPipelineBuilder<R> {
        SessionPipelineBuilder {
            registry,
            accessor,
            crypto,
            token_store: None,
            attempts: None,
            clock: None,
            guards: HashMap::new(),
        }
    }

    /// Build the session for `scope` from `args` and the request's transport
    /// media, writing any persisted credential back into `request`.
    ///
    /// Fails only for unknown or deactivated scopes and for collaborator
    /// errors. Authentication failures are reported on the returned session.
    pub fn construct(
        &self,
        scope: &str,
        args: InitArgs<R>,
        request: &mut HostRequest,
    ) -> PipelineResult<Session<R>> {
        let handle = self
            .inner
            .registry
            .get(scope)
            .ok_or_else(|| PipelineError::UnknownScope(scope.to_string()))?;
        if !handle.is_active() {
            warn!(scope, "session scope is not activated");
            return Err(PipelineError::NotActivated(scope.to_string()));
        }

        let runtime = handle.runtime();
        let instance = handle.next_instance();
        let span = info_span!("session.construct", scope, instance);
        let _entered = span.enter();

        let InitArgs {
            credentials,
            id,
            remember_me,
        } = args;
        let keys = runtime.keys.with_id(id.as_deref());
        let mut session = Session::new(
            Arc::clone(&handle),
            self.inner.ledger.clone(),
            instance,
            keys.clone(),
        );
        session.id = id;
        session.credentials = credentials;
        if let Some(remember_me) = remember_me {
            session.remember_me = remember_me;
        }

        let config = handle.config();
        let now = self.inner.ledger.now();
        {
            let mut cx = StageContext {
                session: &mut session,
                request,
                config,
                keys: &keys,
                inner: &self.inner,
                now,
            };
            for stage in &self.inner.stages {
                if stage.run(&mut cx)? == Flow::Halt {
                    debug!(stage = stage.name(), "pipeline halted");
                    break;
                }
            }
        }
        session.credentials = None;

        match session.record_id() {
            Some(record_id) => {
                info!(
                    record_id = %record_id,
                    resolution = ?session.resolution,
                    "session authenticated"
                );
                session.events.push(SessionEvent::Authenticated {
                    scope: config.name.clone(),
                    record_id,
                    transport: session
                        .resolution
                        .and_then(|resolution| resolution.transport()),
                    timestamp: now,
                });
            }
            None => {
                if config.http_auth.request_basic
                    && config.is_enabled(TransportKind::HttpAuth)
                {
                    session.challenge = Some(HttpAuthTransport::challenge(
                        &config.http_auth.realm,
                    ));
                }
                debug!(
                    errors = session.errors.len(),
                    "session not authenticated"
                );
            }
        }

        Ok(session)
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.inner.registry
    }

    pub fn perishable_tokens(&self) -> &PerishableTokens {
        &self.inner.perishable
    }

    /// The record bound to a fresh perishable token, without consuming it.
    pub fn find_using_perishable_token(
        &self,
        scope: &str,
        token: &str,
    ) -> PipelineResult<Option<R>> {
        let Some(record_id) = self.inner.perishable.verify(scope, token)? else {
            return Ok(None);
        };
        self.inner
            .accessor
            .find_by_id(&record_id)
            .map_err(PipelineError::Accessor)
    }

    /// Issue the record's single access token, replacing any previous one.
    /// Single access tokens authenticate parameter requests statelessly and
    /// do not expire.
    pub fn issue_single_access_token(
        &self,
        scope: &str,
        record_id: &RecordId,
    ) -> PipelineResult<TokenSecret> {
        if self.inner.registry.get(scope).is_none() {
            return Err(PipelineError::UnknownScope(scope.to_string()));
        }
        self.inner.ledger.replace(
            TokenKind::SingleAccess,
            scope,
            record_id,
            Lifetime::unbounded(),
        )
    }

    /// Revoke every persistence token of a record, logging it out of all
    /// devices on their next request.
    pub fn revoke_sessions(
        &self,
        scope: &str,
        record_id: &RecordId,
    ) -> PipelineResult<u64> {
        let revoked = self.inner.ledger.revoke_for_record(
            scope,
            record_id,
            TokenKind::Persistence,
        )?;
        info!(scope, record_id = %record_id, revoked, "revoked sessions");
        Ok(revoked)
    }
}

/// Builder for [`SessionPipeline`]. Stores default to in-memory
/// implementations and the clock to [`SystemClock`].
pub struct SessionPipelineBuilder<R> {
    registry: Arc<ScopeRegistry>,
    accessor: Arc<dyn RecordAccessor<R>>,
    crypto: Arc<AuthCrypto>,
    token_store: Option<Arc<dyn TokenStore>>,
    attempts: Option<Arc<dyn AttemptCounter>>,
    clock: Option<Arc<dyn Clock>>,
    guards: HashMap<String, Vec<Arc<dyn Guard<R>>>>,
}

impl<R> fmt::Debug for SessionPipelineBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPipelineBuilder")
            .field("registry", &self.registry)
            .field("token_store", &self.token_store)
            .field("attempts", &self.attempts)
            .field("clock", &self.clock)
            .field("guarded_scopes", &self.guards.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<R: Identity> SessionPipelineBuilder<R> {
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_attempt_counter(
        mut self,
        attempts: Arc<dyn AttemptCounter>,
    ) -> Self {
        self.attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Append a custom guard to `scope`'s chain. Custom guards run after the
    /// magic state and brute force guards, in registration order.
    #[must_use]
    pub fn with_guard(
        mut self,
        scope: impl Into<String>,
        guard: impl Guard<R> + 'static,
    ) -> Self {
        self.guards
            .entry(scope.into())
            .or_default()
            .push(Arc::new(guard));
        self
    }

    pub fn build(self) -> SessionPipeline<R> {
        let store = self.token_store.unwrap_or_else(|| {
            Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>
        });
        let attempts = self
            .attempts
            .unwrap_or_else(|| {
                Arc::new(MemoryAttemptCounter::new()) as Arc<dyn AttemptCounter>
            });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let ledger = TokenLedger::new(store, self.crypto, clock);
        let perishable =
            PerishableTokens::new(ledger.clone(), Arc::clone(&self.registry));

        SessionPipeline {
            inner: Arc::new(PipelineInner {
                registry: self.registry,
                accessor: self.accessor,
                ledger,
                attempts,
                guards: self.guards,
                stages: default_stages(),
                perishable,
            }),
        }
    }
}
