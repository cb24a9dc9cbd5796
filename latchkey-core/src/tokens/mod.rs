//! Issued tokens: persistence, perishable and single-access.

mod perishable;
mod secret;
mod store;

pub use perishable::PerishableTokens;
pub use secret::{TokenError, TokenSecret};
pub use store::{IssuedToken, MemoryTokenStore, TokenKind, TokenStore};
pub(crate) use store::sweep_due;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::crypto::AuthCrypto;
use crate::error::{PipelineError, PipelineResult};
use crate::identity::RecordId;

/// A token found in the store, with the digest it is indexed under.
#[derive(Debug, Clone)]
pub(crate) struct FoundToken {
    pub(crate) digest: String,
    pub(crate) token: IssuedToken,
}

/// How long an issued token may authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Lifetime {
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) idle_timeout: Option<Duration>,
}

impl Lifetime {
    pub(crate) fn unbounded() -> Self {
        Self::default()
    }
}

/// Issues, finds and revokes tokens against a [`TokenStore`], digesting raw
/// values with [`AuthCrypto::hash_token`] on the way in.
#[derive(Debug, Clone)]
pub(crate) struct TokenLedger {
    store: Arc<dyn TokenStore>,
    crypto: Arc<AuthCrypto>,
    clock: Arc<dyn Clock>,
}

impl TokenLedger {
    pub(crate) fn new(
        store: Arc<dyn TokenStore>,
        crypto: Arc<AuthCrypto>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            crypto,
            clock,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn crypto(&self) -> &AuthCrypto {
        &self.crypto
    }

    fn mint(
        &self,
        kind: TokenKind,
        scope: &str,
        record_id: &RecordId,
        lifetime: Lifetime,
    ) -> PipelineResult<(TokenSecret, String, IssuedToken)> {
        let secret = TokenSecret::generate()?;
        let now = self.now();
        let digest = self.crypto.hash_token(secret.as_str());
        let token = IssuedToken {
            kind,
            scope: scope.to_string(),
            record_id: record_id.clone(),
            issued_at: now,
            last_activity: now,
            expires_at: lifetime.expires_at,
            idle_timeout: lifetime.idle_timeout,
        };
        Ok((secret, digest, token))
    }

    pub(crate) fn issue(
        &self,
        kind: TokenKind,
        scope: &str,
        record_id: &RecordId,
        lifetime: Lifetime,
    ) -> PipelineResult<TokenSecret> {
        let (secret, digest, token) =
            self.mint(kind, scope, record_id, lifetime)?;
        self.store
            .insert(&digest, token)
            .map_err(PipelineError::TokenStore)?;

        debug!(
            scope,
            record_id = %record_id,
            kind = %kind,
            token = %secret,
            expires_at = ?lifetime.expires_at,
            "issued token"
        );
        Ok(secret)
    }

    /// Issue a token that supersedes every token of the same kind held by
    /// the record.
    pub(crate) fn replace(
        &self,
        kind: TokenKind,
        scope: &str,
        record_id: &RecordId,
        lifetime: Lifetime,
    ) -> PipelineResult<TokenSecret> {
        let (secret, digest, token) =
            self.mint(kind, scope, record_id, lifetime)?;
        let revoked = self
            .store
            .replace_for_record(&digest, token)
            .map_err(PipelineError::TokenStore)?;

        debug!(
            scope,
            record_id = %record_id,
            kind = %kind,
            token = %secret,
            revoked,
            "replaced token"
        );
        Ok(secret)
    }

    pub(crate) fn lookup(
        &self,
        secret: &TokenSecret,
    ) -> PipelineResult<Option<FoundToken>> {
        let digest = self.crypto.hash_token(secret.as_str());
        let token = self
            .store
            .find(&digest)
            .map_err(PipelineError::TokenStore)?;
        Ok(token.map(|token| FoundToken { digest, token }))
    }

    pub(crate) fn touch(&self, digest: &str) -> PipelineResult<()> {
        self.store
            .touch(digest, self.now())
            .map_err(PipelineError::TokenStore)
    }

    pub(crate) fn revoke_digest(&self, digest: &str) -> PipelineResult<()> {
        self.store
            .revoke(digest)
            .map(|_| ())
            .map_err(PipelineError::TokenStore)
    }

    pub(crate) fn revoke(&self, secret: &TokenSecret) -> PipelineResult<()> {
        self.revoke_digest(&self.crypto.hash_token(secret.as_str()))
    }

    pub(crate) fn revoke_for_record(
        &self,
        scope: &str,
        record_id: &RecordId,
        kind: TokenKind,
    ) -> PipelineResult<u64> {
        self.store
            .revoke_for_record(scope, record_id, kind)
            .map_err(PipelineError::TokenStore)
    }
}
