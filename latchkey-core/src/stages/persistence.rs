use tracing::debug;

use super::{Flow, Stage, StageContext};
use crate::error::PipelineResult;
use crate::identity::Identity;
use crate::tokens::{Lifetime, TokenKind};
use crate::transport::{Persisted, transport_for};

/// Writes the session's persistence token to every enabled persisting
/// transport. Stateless sessions write nothing.
#[derive(Debug)]
pub(crate) struct PersistenceStage;

impl<R: Identity> Stage<R> for PersistenceStage {
    fn name(&self) -> &'static str {
        "persistence"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        let (Some(record_id), Some(resolution)) = (
            cx.session.record.as_ref().map(Identity::id),
            cx.session.resolution,
        ) else {
            return Ok(Flow::Continue);
        };
        if resolution.is_stateless() {
            return Ok(Flow::Continue);
        }

        let config = cx.config;
        let inner = cx.inner;
        if resolution.is_login() && cx.session.remember_me {
            cx.session.remember_until =
                Some(cx.now + config.cookie.remember_me_for);
        }

        let token = match cx.session.persistence_token.take() {
            Some(token) => token,
            None => inner.ledger.issue(
                TokenKind::Persistence,
                &config.name,
                &record_id,
                Lifetime {
                    expires_at: cx.session.remember_until,
                    idle_timeout: config.timeout,
                },
            )?,
        };
        if let Some(digest) = cx.session.persistence_digest.as_deref() {
            inner.ledger.touch(digest)?;
        }

        let ctx = cx.transport_context();
        let persisted = Persisted {
            token: &token,
            record_id: &record_id,
            remember_until: cx.session.remember_until,
        };
        for kind in &config.transports {
            let transport = transport_for(*kind);
            if transport.persists() {
                transport.save(&ctx, &persisted, cx.request);
                debug!(
                    scope = %config.name,
                    transport = %kind,
                    record_id = %record_id,
                    "persisted session"
                );
            }
        }

        cx.session.persistence_token = Some(token);
        Ok(Flow::Continue)
    }
}
