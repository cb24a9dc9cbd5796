//! # Latchkey Core
//!
//! Credential resolution and session lifecycle for request-driven hosts.
//!
//! ## Overview
//!
//! For one request and one scope, a [`SessionPipeline`] decides whether a
//! previously authenticated identity can be restored, whether freshly
//! supplied credentials are valid, whether the resulting identity may hold a
//! session, and where the outcome is persisted for the next request.
//!
//! - **Transports**: cookie, native session, request parameters and HTTP
//!   basic authentication, tried in a configurable priority order
//! - **Guards**: magic states, brute force protection and custom predicates
//!   that may veto a resolved record
//! - **Tokens**: HMAC-digested persistence, perishable and single access
//!   tokens behind a [`TokenStore`]
//! - **Scopes**: namespaced configuration so `user` and `admin` sessions
//!   coexist, frozen once the first session of a scope is built
//!
//! ## Architecture
//!
//! - [`pipeline`]: the orchestrator and its builder
//! - [`session`]: the per-request session aggregate
//! - [`transport`]: the credential media
//! - [`scope`]: scope configuration and registry
//! - [`identity`]: the record accessor port
//! - [`tokens`]: token issuance and storage
//! - [`brute_force`]: failed login counting
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use latchkey_core::{
//!     AuthCrypto, HostRequest, InitArgs, MemoryUser, MemoryUserStore, ScopeConfig,
//!     ScopeRegistry, SessionPipeline,
//! };
//!
//! fn login() -> Result<(), Box<dyn std::error::Error>> {
//!     let crypto = Arc::new(AuthCrypto::new("pepper", "token-key")?);
//!     let users = Arc::new(MemoryUserStore::new(Arc::clone(&crypto)));
//!     users.insert_user("alice", "correct horse")?;
//!
//!     let registry =
//!         Arc::new(ScopeRegistry::new().with_scope(ScopeConfig::new("user"))?);
//!     let pipeline =
//!         SessionPipeline::<MemoryUser>::builder(registry, users, crypto)
//!             .build();
//!
//!     let mut request = HostRequest::new();
//!     let session = pipeline.construct(
//!         "user",
//!         InitArgs::password("alice", "correct horse"),
//!         &mut request,
//!     )?;
//!     assert!(session.is_authenticated());
//!     for cookie in request.cookie_delta() {
//!         println!("Set-Cookie: {cookie}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod brute_force;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod events;
pub mod identity;
pub mod memory;
pub mod pipeline;
pub mod request;
pub mod scope;
pub mod session;
pub mod stages;
pub mod tokens;
pub mod transport;

pub use brute_force::{AttemptCounter, MemoryAttemptCounter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{AuthCrypto, AuthCryptoError};
pub use error::{
    AuthFailure, GuardVeto, PipelineError, PipelineResult, Stage, StageError,
};
pub use events::SessionEvent;
pub use identity::{
    Activity, ActivityKind, Identity, MagicState, RecordAccessor, RecordId,
};
pub use memory::{MemoryStoreError, MemoryUser, MemoryUserStore};
pub use pipeline::{SessionPipeline, SessionPipelineBuilder};
pub use request::{HostRequest, NativeSession};
pub use scope::{
    BruteForceSettings, CookieSettings, HttpAuthSettings, RegistryError,
    SameSitePolicy, ScopeConfig, ScopeRegistry, SingleAccessAllowed,
};
pub use session::{Credentials, InitArgs, Resolution, Session};
pub use stages::{
    BruteForceGuard, FnGuard, Guard, GuardContext, MagicStateGuard, guard_fn,
};
pub use tokens::{
    MemoryTokenStore, PerishableTokens, TokenKind, TokenSecret, TokenStore,
};
pub use transport::{TransportKind, UnknownTransport};
