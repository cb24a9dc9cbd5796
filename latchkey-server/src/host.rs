//! Adapts axum requests and responses to the pipeline's transport media.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::Response,
};
use cookie::Cookie;
use latchkey_core::{HostRequest, NativeSession};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::{AppState, NativeSessionStore};

/// Cookie naming the client's native session.
pub const SESSION_ID_COOKIE: &str = "latchkey_sid";

/// Transport media of one HTTP exchange.
///
/// Extracted before the handler runs; [`HostMedia::finish`] writes the
/// cookie delta and any native session change onto the response.
#[derive(Debug)]
pub struct HostMedia {
    pub request: HostRequest,
    /// Native session id, only when the store knows it.
    sid: Option<String>,
}

impl FromRequestParts<AppState> for HostMedia {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, &state.native_sessions))
    }
}

impl HostMedia {
    pub fn from_parts(parts: &Parts, sessions: &NativeSessionStore) -> Self {
        let mut request = HostRequest::new();
        for value in parts.headers.get_all(header::COOKIE) {
            match value.to_str() {
                Ok(raw) => request = request.with_cookie_header(raw),
                Err(_) => debug!("skipping non-ascii cookie header"),
            }
        }

        let mut sid = None;
        if let Some(presented) = request
            .cookies()
            .get(SESSION_ID_COOKIE)
            .map(|cookie| cookie.value().to_string())
        {
            match sessions.load(&presented) {
                Some(values) => {
                    request = request
                        .with_native_session(NativeSession::from_values(values));
                    sid = Some(presented);
                }
                None => debug!("unknown native session id presented"),
            }
        }

        match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
            Ok(Query(params)) => request = request.with_params(params),
            Err(err) => debug!(error = %err, "ignoring malformed query string"),
        }

        if let Some(authorization) =
            header_str(&parts.headers, header::AUTHORIZATION)
        {
            request = request.with_authorization(authorization);
        }
        if let Some(format) = header_str(&parts.headers, header::ACCEPT)
            .and_then(primary_media_type)
        {
            request = request.with_format(format);
        }
        if let Some(ConnectInfo(addr)) =
            parts.extensions.get::<ConnectInfo<SocketAddr>>()
        {
            request = request.with_remote_ip(addr.ip());
        }

        Self { request, sid }
    }

    /// Write the pipeline's side effects onto `response`.
    pub fn finish(
        self,
        mut response: Response,
        sessions: &NativeSessionStore,
    ) -> Response {
        let Self { request, sid } = self;
        let mut set_cookies: Vec<String> = request
            .cookie_delta()
            .map(|cookie| cookie.to_string())
            .collect();

        let native = request.into_native_session();
        if native.is_dirty() {
            if native.is_empty() {
                if let Some(sid) = sid {
                    sessions.remove(&sid);
                    let mut removal = Cookie::build((SESSION_ID_COOKIE, ""))
                        .path("/")
                        .build();
                    removal.make_removal();
                    set_cookies.push(removal.to_string());
                }
            } else {
                let sid = sid.unwrap_or_else(|| {
                    let fresh = Uuid::new_v4().simple().to_string();
                    let cookie = Cookie::build((SESSION_ID_COOKIE, fresh.clone()))
                        .path("/")
                        .http_only(true)
                        .same_site(cookie::SameSite::Lax)
                        .build();
                    set_cookies.push(cookie.to_string());
                    fresh
                });
                sessions.store(sid, native.into_values());
            }
        }

        let headers = response.headers_mut();
        for value in set_cookies {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(err) => warn!(error = %err, "dropping unencodable cookie"),
            }
        }
        response
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// First media type of an `Accept` header, without parameters.
fn primary_media_type(accept: &str) -> Option<&str> {
    let first = accept.split(',').next()?.split(';').next()?.trim();
    (!first.is_empty() && first != "*/*").then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse};

    fn parts(request: Request<Body>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn request_media_are_read_from_headers() {
        let sessions = NativeSessionStore::new();
        let parts = parts(
            Request::builder()
                .uri("/user/session?user_credentials=abc&page=2")
                .header(header::COOKIE, "user_credentials=tok::1; theme=dark")
                .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
                .header(header::ACCEPT, "application/rss+xml;q=0.9, text/html")
                .body(Body::empty())
                .unwrap(),
        );

        let media = HostMedia::from_parts(&parts, &sessions);
        let request = &media.request;
        assert_eq!(
            request.cookies().get("user_credentials").unwrap().value(),
            "tok::1"
        );
        assert_eq!(request.param("user_credentials"), Some("abc"));
        assert_eq!(request.authorization(), Some("Basic YWxpY2U6c2VjcmV0"));
        assert_eq!(request.format(), Some("application/rss+xml"));
        assert!(request.native_session().is_empty());
    }

    #[test]
    fn native_session_is_created_and_cleared() {
        let sessions = NativeSessionStore::new();
        let plain = parts(Request::builder().body(Body::empty()).unwrap());

        let mut media = HostMedia::from_parts(&plain, &sessions);
        media.request.native_session_mut().insert("user_credentials", "t");
        let response = media.finish(().into_response(), &sessions);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let sid = set_cookie
            .strip_prefix("latchkey_sid=")
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();
        assert_eq!(sessions.len(), 1);

        let returning = parts(
            Request::builder()
                .header(header::COOKIE, format!("latchkey_sid={sid}"))
                .body(Body::empty())
                .unwrap(),
        );
        let mut media = HostMedia::from_parts(&returning, &sessions);
        assert_eq!(
            media.request.native_session().get("user_credentials"),
            Some("t")
        );
        media.request.native_session_mut().remove("user_credentials");
        let response = media.finish(().into_response(), &sessions);
        assert!(sessions.is_empty());
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }

    #[test]
    fn unknown_session_ids_are_not_adopted() {
        let sessions = NativeSessionStore::new();
        let forged = parts(
            Request::builder()
                .header(header::COOKIE, "latchkey_sid=chosen-by-client")
                .body(Body::empty())
                .unwrap(),
        );

        let mut media = HostMedia::from_parts(&forged, &sessions);
        media.request.native_session_mut().insert("k", "v");
        media.finish(().into_response(), &sessions);

        assert!(sessions.load("chosen-by-client").is_none());
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn wildcard_accept_has_no_format() {
        assert_eq!(primary_media_type("*/*"), None);
        assert_eq!(primary_media_type(" text/html ; q=1"), Some("text/html"));
    }
}
