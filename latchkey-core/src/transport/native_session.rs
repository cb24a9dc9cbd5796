use super::{
    Persisted, Presented, PresentedToken, Transport, TransportContext,
    TransportKind,
};
use crate::identity::RecordId;
use crate::request::HostRequest;
use crate::tokens::{TokenKind, TokenSecret};

/// Persistence token stored in the server-side session under `<key>`, with
/// the record id under `<key>_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSessionTransport;

impl Transport for NativeSessionTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::NativeSession
    }

    fn load(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<Presented> {
        let session = request.native_session();
        let token = session.get(&ctx.keys.native_session)?;
        let secret = TokenSecret::from_presented(token).ok()?;
        let record_id = session
            .get(&ctx.keys.native_session_id())
            .filter(|id| !id.is_empty())
            .map(RecordId::new);

        Some(Presented::Token(PresentedToken {
            secret,
            record_id,
            remember_until: None,
            kinds: &[TokenKind::Persistence],
        }))
    }

    fn persists(&self) -> bool {
        true
    }

    fn save(
        &self,
        ctx: &TransportContext<'_>,
        persisted: &Persisted<'_>,
        request: &mut HostRequest,
    ) {
        let session = request.native_session_mut();
        session.insert(
            ctx.keys.native_session.clone(),
            persisted.token.as_str(),
        );
        session.insert(
            ctx.keys.native_session_id(),
            persisted.record_id.as_str(),
        );
    }

    fn invalidate(&self, ctx: &TransportContext<'_>, request: &mut HostRequest) {
        let session = request.native_session_mut();
        session.remove(&ctx.keys.native_session);
        session.remove(&ctx.keys.native_session_id());
    }
}
