use tracing::debug;

use super::credentials::validate_password;
use super::{Flow, Stage, StageContext};
use crate::error::{PipelineError, PipelineResult, Stage as StageName};
use crate::events::SessionEvent;
use crate::identity::Identity;
use crate::session::Resolution;
use crate::tokens::{Lifetime, TokenKind};
use crate::transport::{
    Presented, PresentedToken, TransportKind, transport_for,
};

/// Restores a session from the first transport, in configured order, whose
/// credential resolves to a record. Skipped when credentials were supplied.
#[derive(Debug)]
pub(crate) struct TransportStage;

impl<R: Identity> Stage<R> for TransportStage {
    fn name(&self) -> &'static str {
        "transports"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        if cx.session.credentials.is_some() {
            return Ok(Flow::Continue);
        }

        let config = cx.config;
        let ctx = cx.transport_context();
        for kind in &config.transports {
            let transport = transport_for(*kind);
            let Some(presented) = transport.load(&ctx, cx.request) else {
                continue;
            };

            let resolved = match presented {
                Presented::Token(token) => resolve_token(cx, *kind, token)?,
                Presented::Password(credentials) => validate_password(
                    cx,
                    &credentials,
                    StageName::Transport(*kind),
                )?
                .map(|record| (record, Resolution::HttpAuth)),
            };

            match resolved {
                Some((record, resolution)) => {
                    debug!(
                        scope = %config.name,
                        transport = %kind,
                        record_id = %record.id(),
                        "restored session"
                    );
                    cx.session.record = Some(record);
                    cx.session.resolution = Some(resolution);
                    break;
                }
                None if transport.persists() => {
                    transport.invalidate(&ctx, cx.request);
                }
                None => {}
            }
        }
        Ok(Flow::Continue)
    }
}

/// Resolve a presented token to its record.
///
/// Lapsed tokens are revoked and resolve to nothing. Perishable tokens are
/// consumed. Persistence tokens are rotated when the scope asks for it;
/// otherwise the presented token stays in use. A remembered session's end
/// comes from the stored token, never from what the client sent.
fn resolve_token<R: Identity>(
    cx: &mut StageContext<'_, R>,
    transport: TransportKind,
    presented: PresentedToken,
) -> PipelineResult<Option<(R, Resolution)>> {
    let config = cx.config;
    let inner = cx.inner;
    let ledger = &inner.ledger;

    let Some(found) = ledger.lookup(&presented.secret)? else {
        debug!(
            scope = %config.name,
            transport = %transport,
            token = %presented.secret,
            "unknown token"
        );
        return Ok(None);
    };
    let token = found.token;

    if token.scope != config.name || !presented.accepts(token.kind) {
        debug!(
            scope = %config.name,
            transport = %transport,
            kind = %token.kind,
            "token not accepted by this transport"
        );
        return Ok(None);
    }
    if let Some(record_id) = &presented.record_id
        && record_id != &token.record_id
    {
        debug!(
            scope = %config.name,
            transport = %transport,
            "token presented for a different record"
        );
        return Ok(None);
    }

    if token.is_expired(cx.now) {
        debug!(
            scope = %config.name,
            transport = %transport,
            kind = %token.kind,
            record_id = %token.record_id,
            "token lapsed"
        );
        ledger.revoke_digest(&found.digest)?;
        return Ok(None);
    }

    if token.kind == TokenKind::Perishable {
        ledger.revoke_digest(&found.digest)?;
        if token.issued_at + config.perishable_token_valid_for < cx.now {
            debug!(
                scope = %config.name,
                record_id = %token.record_id,
                "perishable token expired"
            );
            return Ok(None);
        }
    }

    let Some(record) = inner
        .accessor
        .find_by_id(&token.record_id)
        .map_err(PipelineError::Accessor)?
    else {
        debug!(
            scope = %config.name,
            record_id = %token.record_id,
            "token owner no longer exists"
        );
        ledger.revoke_digest(&found.digest)?;
        return Ok(None);
    };

    if token.kind == TokenKind::Persistence {
        cx.session.last_activity = Some(token.last_activity);
        cx.session.remember_until = token.expires_at;

        if config.rotate_persistence_token {
            ledger.revoke_digest(&found.digest)?;
            let fresh = ledger.issue(
                TokenKind::Persistence,
                &config.name,
                &token.record_id,
                Lifetime {
                    expires_at: token.expires_at,
                    idle_timeout: token.idle_timeout,
                },
            )?;
            cx.session.persistence_token = Some(fresh);
            cx.emit(SessionEvent::TokenRotated {
                scope: cx.scope(),
                record_id: token.record_id.clone(),
                timestamp: cx.now,
            });
        } else {
            cx.session.persistence_token = Some(presented.secret);
            cx.session.persistence_digest = Some(found.digest);
        }
    }

    Ok(Some((
        record,
        Resolution::Token {
            transport,
            kind: token.kind,
        },
    )))
}
