use tracing::debug;

use super::{Flow, Stage, StageContext};
use crate::error::{PipelineError, PipelineResult};
use crate::identity::{Activity, ActivityKind, Identity};
use crate::session::Resolution;
use crate::tokens::TokenKind;

/// Reports the outcome to the record accessor so it can maintain activity
/// columns. Request activity is throttled by `last_request_at_threshold`.
#[derive(Debug)]
pub(crate) struct ActivityStage;

impl<R: Identity> Stage<R> for ActivityStage {
    fn name(&self) -> &'static str {
        "activity"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        let config = cx.config;
        let inner = cx.inner;
        let (Some(record), Some(resolution)) =
            (cx.session.record.as_ref(), cx.session.resolution)
        else {
            return Ok(Flow::Continue);
        };

        let kind = if resolution.is_login() {
            ActivityKind::Login
        } else {
            ActivityKind::Request
        };

        let throttled = kind == ActivityKind::Request
            && record.last_request_at().is_some_and(|last| {
                cx.now - last < config.last_request_at_threshold
            });
        if throttled {
            debug!(
                scope = %config.name,
                record_id = %record.id(),
                "request activity throttled"
            );
        } else {
            inner
                .accessor
                .record_activity(
                    record,
                    &Activity {
                        kind,
                        at: cx.now,
                        remote_ip: cx.request.remote_ip(),
                    },
                )
                .map_err(PipelineError::Accessor)?;
        }

        if config.maintain_perishable_token
            && resolution == Resolution::Password
        {
            inner.ledger.revoke_for_record(
                &config.name,
                &record.id(),
                TokenKind::Perishable,
            )?;
        }

        cx.session.last_activity = Some(cx.now);
        Ok(Flow::Continue)
    }
}
