use super::{Presented, PresentedToken, Transport, TransportContext, TransportKind};
use crate::request::HostRequest;
use crate::tokens::{TokenKind, TokenSecret};

/// Token presented as a request parameter. Never persisted.
///
/// Single access tokens are only honoured for the request formats the scope
/// allows; perishable tokens are accepted for any format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamsTransport;

impl Transport for ParamsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Params
    }

    fn load(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<Presented> {
        let raw = request.param(&ctx.keys.params)?;
        let secret = TokenSecret::from_presented(raw).ok()?;

        let kinds: &'static [TokenKind] = if ctx
            .config
            .params
            .single_access_allowed
            .permits(request.format())
        {
            &[TokenKind::SingleAccess, TokenKind::Perishable]
        } else {
            &[TokenKind::Perishable]
        };

        Some(Presented::Token(PresentedToken {
            secret,
            record_id: None,
            remember_until: None,
            kinds,
        }))
    }
}
