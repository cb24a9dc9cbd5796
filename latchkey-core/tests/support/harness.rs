use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::Params;
use chrono::Duration;

use latchkey_core::{
    AuthCrypto, HostRequest, InitArgs, ManualClock, MemoryUser,
    MemoryUserStore, ScopeConfig, ScopeRegistry, Session, SessionPipeline,
    SessionPipelineBuilder,
};

pub const TEST_PASSWORD: &str = "StrongPassword123!";

/// In-memory pipeline with a manual clock and cheap Argon2 parameters.
pub struct TestSessionHarness {
    clock: Arc<ManualClock>,
    crypto: Arc<AuthCrypto>,
    users: Arc<MemoryUserStore>,
    pipeline: SessionPipeline<MemoryUser>,
}

impl TestSessionHarness {
    pub fn new(scopes: impl IntoIterator<Item = ScopeConfig>) -> Result<Self> {
        Self::with_builder(scopes, |builder| builder)
    }

    /// Build a harness, letting the test add guards or stores.
    pub fn with_builder(
        scopes: impl IntoIterator<Item = ScopeConfig>,
        configure: impl FnOnce(
            SessionPipelineBuilder<MemoryUser>,
        ) -> SessionPipelineBuilder<MemoryUser>,
    ) -> Result<Self> {
        let crypto = Arc::new(AuthCrypto::with_params(
            "test-pepper",
            "test-token-key",
            Params::new(1024, 1, 1, Some(32))
                .map_err(|err| anyhow::anyhow!(err.to_string()))?,
        )?);
        let clock = Arc::new(ManualClock::starting_now());
        let users = Arc::new(MemoryUserStore::new(Arc::clone(&crypto)));

        let registry = ScopeRegistry::new();
        for scope in scopes {
            registry.register(scope)?;
        }

        let builder = SessionPipeline::<MemoryUser>::builder(
            Arc::new(registry),
            users.clone(),
            Arc::clone(&crypto),
        )
        .with_clock(clock.clone());
        let pipeline = configure(builder).build();

        Ok(Self {
            clock,
            crypto,
            users,
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &SessionPipeline<MemoryUser> {
        &self.pipeline
    }

    pub fn users(&self) -> &MemoryUserStore {
        &self.users
    }

    pub fn crypto(&self) -> &AuthCrypto {
        &self.crypto
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn create_user(&self, login: &str) -> Result<MemoryUser> {
        self.users
            .insert_user(login, TEST_PASSWORD)
            .with_context(|| format!("creating user {login}"))
    }

    pub fn construct(
        &self,
        scope: &str,
        args: InitArgs<MemoryUser>,
        request: &mut HostRequest,
    ) -> Result<Session<MemoryUser>> {
        Ok(self.pipeline.construct(scope, args, request)?)
    }

    /// Password login on a fresh request. Returns the session and the
    /// request carrying whatever was persisted.
    pub fn login(
        &self,
        scope: &str,
        login: &str,
        password: &str,
    ) -> Result<(Session<MemoryUser>, HostRequest)> {
        self.login_with(scope, InitArgs::password(login, password))
    }

    pub fn login_with(
        &self,
        scope: &str,
        args: InitArgs<MemoryUser>,
    ) -> Result<(Session<MemoryUser>, HostRequest)> {
        let mut request = HostRequest::new();
        let session = self.construct(scope, args, &mut request)?;
        Ok((session, request))
    }

    /// Restore a session on the request a browser would send after
    /// `previous`.
    pub fn restore(
        &self,
        scope: &str,
        previous: &HostRequest,
    ) -> Result<(Session<MemoryUser>, HostRequest)> {
        let mut request = previous.follow_up();
        let session = self.construct(scope, InitArgs::none(), &mut request)?;
        Ok((session, request))
    }
}

/// Value of the cookie `name` as the client would now hold it.
pub fn cookie_value(request: &HostRequest, name: &str) -> Option<String> {
    request
        .follow_up()
        .cookies()
        .get(name)
        .map(|cookie| cookie.value().to_string())
}
