use std::sync::Arc;
use tracing::debug;

use super::{Lifetime, TokenKind, TokenLedger, TokenSecret};
use crate::error::{PipelineError, PipelineResult};
use crate::identity::RecordId;
use crate::scope::ScopeRegistry;

/// Short-lived, rotating tokens bound one-to-one to a record.
///
/// Issuing a token for a record revokes whatever perishable token the record
/// held before, so at most one is valid at a time. Freshness is measured
/// from issue time against the scope's `perishable_token_valid_for`.
#[derive(Debug, Clone)]
pub struct PerishableTokens {
    ledger: TokenLedger,
    registry: Arc<ScopeRegistry>,
}

impl PerishableTokens {
    pub(crate) fn new(ledger: TokenLedger, registry: Arc<ScopeRegistry>) -> Self {
        Self { ledger, registry }
    }

    pub fn issue(
        &self,
        scope: &str,
        record_id: &RecordId,
    ) -> PipelineResult<TokenSecret> {
        let valid_for = self.valid_for(scope)?;
        let lifetime = Lifetime {
            expires_at: Some(self.ledger.now() + valid_for),
            idle_timeout: None,
        };
        self.ledger
            .replace(TokenKind::Perishable, scope, record_id, lifetime)
    }

    /// Invalidate the current token and issue a replacement.
    pub fn rotate(
        &self,
        scope: &str,
        record_id: &RecordId,
    ) -> PipelineResult<TokenSecret> {
        self.issue(scope, record_id)
    }

    /// Check binding and freshness without consuming the token.
    pub fn verify(
        &self,
        scope: &str,
        token: &str,
    ) -> PipelineResult<Option<RecordId>> {
        let valid_for = self.valid_for(scope)?;

        let Ok(secret) = TokenSecret::from_presented(token) else {
            return Ok(None);
        };
        let Some(found) = self.ledger.lookup(&secret)? else {
            return Ok(None);
        };
        if found.token.kind != TokenKind::Perishable
            || found.token.scope != scope
        {
            return Ok(None);
        }

        if found.token.issued_at + valid_for < self.ledger.now() {
            debug!(
                scope,
                record_id = %found.token.record_id,
                "perishable token expired"
            );
            self.ledger.revoke_digest(&found.digest)?;
            return Ok(None);
        }

        Ok(Some(found.token.record_id))
    }

    /// Verify and revoke in one step. Used for one-time handoffs.
    pub fn consume(
        &self,
        scope: &str,
        token: &str,
    ) -> PipelineResult<Option<RecordId>> {
        let record_id = self.verify(scope, token)?;
        if record_id.is_some()
            && let Ok(secret) = TokenSecret::from_presented(token)
        {
            self.ledger.revoke(&secret)?;
        }
        Ok(record_id)
    }

    /// Revoke the record's outstanding token, if any.
    pub fn revoke(
        &self,
        scope: &str,
        record_id: &RecordId,
    ) -> PipelineResult<u64> {
        self.ledger
            .revoke_for_record(scope, record_id, TokenKind::Perishable)
    }

    fn valid_for(&self, scope: &str) -> PipelineResult<chrono::Duration> {
        Ok(self
            .registry
            .get(scope)
            .ok_or_else(|| PipelineError::UnknownScope(scope.to_string()))?
            .config()
            .perishable_token_valid_for)
    }
}
