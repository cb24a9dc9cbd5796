use tracing::info;

use super::{Flow, Stage, StageContext};
use crate::error::{AuthFailure, PipelineResult, Stage as StageName};
use crate::events::SessionEvent;
use crate::identity::Identity;
use crate::tokens::TokenKind;
use crate::transport::{Presented, transport_for};

/// Discards persisted tokens that lapsed before any other stage can resolve
/// them: idle longer than the scope's timeout, past the end of a remembered
/// login, or carried in a cookie whose remember-me stamp ran out.
#[derive(Debug)]
pub(crate) struct TimeoutStage;

impl<R: Identity> Stage<R> for TimeoutStage {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        let config = cx.config;

        let ctx = cx.transport_context();
        let mut expired = Vec::new();
        for kind in &config.transports {
            let transport = transport_for(*kind);
            if !transport.persists() {
                continue;
            }
            let Some(Presented::Token(presented)) =
                transport.load(&ctx, cx.request)
            else {
                continue;
            };
            let Some(found) = cx.inner.ledger.lookup(&presented.secret)? else {
                continue;
            };
            let token = found.token;
            if token.kind != TokenKind::Persistence
                || token.scope != config.name
            {
                continue;
            }
            let idle = config
                .timeout
                .is_some_and(|timeout| token.last_activity + timeout < cx.now);
            let stamp_lapsed = presented
                .remember_until
                .is_some_and(|until| until.timestamp() <= cx.now.timestamp());
            if !(idle || stamp_lapsed || token.is_expired(cx.now)) {
                continue;
            }

            cx.inner.ledger.revoke_digest(&found.digest)?;
            info!(
                scope = %config.name,
                transport = %kind,
                record_id = %token.record_id,
                idle_seconds = (cx.now - token.last_activity).num_seconds(),
                expires_at = ?token.expires_at,
                "persisted session expired"
            );
            if !expired.contains(&token.record_id) {
                expired.push(token.record_id);
            }
        }

        if expired.is_empty() {
            return Ok(Flow::Continue);
        }

        cx.invalidate_persisting();
        for record_id in expired {
            cx.emit(SessionEvent::Expired {
                scope: cx.scope(),
                record_id,
                timestamp: cx.now,
            });
        }
        cx.fail(StageName::Timeout, AuthFailure::TokenExpired);
        Ok(Flow::Continue)
    }
}
