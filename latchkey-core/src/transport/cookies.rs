use chrono::{DateTime, Utc};
use cookie::Cookie;
use tracing::debug;

use super::{
    Persisted, Presented, PresentedToken, Transport, TransportContext,
    TransportKind,
};
use crate::identity::RecordId;
use crate::request::HostRequest;
use crate::tokens::{TokenKind, TokenSecret};

const SEPARATOR: &str = "::";

/// Persistence token carried in a cookie as `token::record_id`, with a
/// trailing `::<unix seconds>` when the login is remembered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieTransport;

impl CookieTransport {
    fn read_raw(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<String> {
        let name = ctx.keys.cookie.as_str();
        if ctx.config.cookie.sign {
            let verified = request
                .cookies()
                .signed(ctx.crypto.cookie_key())
                .get(name);
            if verified.is_none() && request.cookies().get(name).is_some() {
                debug!(cookie = name, "ignoring cookie with invalid signature");
            }
            verified.map(|cookie| cookie.value().to_string())
        } else {
            request
                .cookies()
                .get(name)
                .map(|cookie| cookie.value().to_string())
        }
    }
}

impl Transport for CookieTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Cookie
    }

    fn load(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<Presented> {
        let raw = self.read_raw(ctx, request)?;
        let value = CookieValue::parse(&raw)?;

        // A lapsed stamp is still presented so its token gets revoked.
        if let Some(until) = value.remember_until
            && until <= ctx.now
        {
            debug!(cookie = %ctx.keys.cookie, "remember-me cookie has lapsed");
        }

        Some(Presented::Token(PresentedToken {
            secret: value.secret,
            record_id: Some(value.record_id),
            remember_until: value.remember_until,
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
        let settings = &ctx.config.cookie;
        let value = CookieValue::format(
            persisted.token,
            persisted.record_id,
            persisted.remember_until,
        );

        let mut builder = Cookie::build((ctx.keys.cookie.clone(), value))
            .path(settings.path.clone())
            .secure(settings.secure)
            .http_only(settings.http_only)
            .same_site(settings.same_site.into());
        if let Some(domain) = &settings.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(until) = persisted.remember_until {
            let seconds = (until - ctx.now).num_seconds().max(0);
            builder = builder.max_age(time::Duration::seconds(seconds));
        }

        if settings.sign {
            request
                .cookies_mut()
                .signed_mut(ctx.crypto.cookie_key())
                .add(builder);
        } else {
            request.cookies_mut().add(builder);
        }
    }

    fn invalidate(&self, ctx: &TransportContext<'_>, request: &mut HostRequest) {
        let settings = &ctx.config.cookie;
        let mut removal = Cookie::build((ctx.keys.cookie.clone(), ""))
            .path(settings.path.clone());
        if let Some(domain) = &settings.domain {
            removal = removal.domain(domain.clone());
        }
        request.cookies_mut().remove(removal);
    }
}

#[derive(Debug)]
struct CookieValue {
    secret: TokenSecret,
    record_id: RecordId,
    remember_until: Option<DateTime<Utc>>,
}

impl CookieValue {
    fn parse(raw: &str) -> Option<Self> {
        let (token, rest) = raw.split_once(SEPARATOR)?;
        let secret = TokenSecret::from_presented(token).ok()?;

        let (record_id, remember_until) = match rest.rsplit_once(SEPARATOR) {
            Some((record_id, stamp)) => match stamp.parse::<i64>() {
                Ok(seconds) => {
                    (record_id, Some(DateTime::from_timestamp(seconds, 0)?))
                }
                Err(_) => (rest, None),
            },
            None => (rest, None),
        };
        if record_id.is_empty() {
            return None;
        }

        Some(Self {
            secret,
            record_id: RecordId::new(record_id),
            remember_until,
        })
    }

    fn format(
        secret: &TokenSecret,
        record_id: &RecordId,
        remember_until: Option<DateTime<Utc>>,
    ) -> String {
        match remember_until {
            Some(until) => format!(
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                secret.as_str(),
                record_id,
                until.timestamp()
            ),
            None => format!("{}{SEPARATOR}{}", secret.as_str(), record_id),
        }
    }
}
