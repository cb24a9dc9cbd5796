//! Per-request transport media.
//!
//! A host adapter fills a [`HostRequest`] from its own request type, hands it
//! to the pipeline, then writes [`HostRequest::cookie_delta`] and the native
//! session back to its response and session store.

use cookie::{Cookie, CookieJar};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Server-side key/value session belonging to one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSession {
    values: HashMap<String, String>,
    dirty: bool,
}

impl NativeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: HashMap<String, String>) -> Self {
        Self {
            values,
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Whether the session changed since it was loaded.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn into_values(self) -> HashMap<String, String> {
        self.values
    }
}

/// Transport media for one inbound request.
#[derive(Default)]
pub struct HostRequest {
    cookies: CookieJar,
    native_session: NativeSession,
    params: HashMap<String, String>,
    authorization: Option<String>,
    format: Option<String>,
    remote_ip: Option<IpAddr>,
}

impl fmt::Debug for HostRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRequest")
            .field(
                "cookies",
                &self.cookies.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "native_session_keys",
                &self.native_session.values.keys().collect::<Vec<_>>(),
            )
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("authorization", &self.authorization.is_some())
            .field("format", &self.format)
            .field("remote_ip", &self.remote_ip)
            .finish()
    }
}

impl HostRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie the client sent.
    #[must_use]
    pub fn with_cookie(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.cookies
            .add_original(Cookie::new(name.into(), value.into()));
        self
    }

    /// Add every cookie from a raw `Cookie` header value. Malformed pairs
    /// are skipped.
    #[must_use]
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for cookie in Cookie::split_parse(header.to_string()).flatten() {
            self.cookies.add_original(cookie.into_owned());
        }
        self
    }

    #[must_use]
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    /// Requested response format (MIME type), consulted by single-access
    /// parameter authentication.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_remote_ip(mut self, ip: IpAddr) -> Self {
        self.remote_ip = Some(ip);
        self
    }

    #[must_use]
    pub fn with_native_session(mut self, session: NativeSession) -> Self {
        self.native_session = session;
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// Cookies to send back to the client (additions and removals).
    pub fn cookie_delta(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.delta()
    }

    pub fn native_session(&self) -> &NativeSession {
        &self.native_session
    }

    pub fn native_session_mut(&mut self) -> &mut NativeSession {
        &mut self.native_session
    }

    pub fn into_native_session(self) -> NativeSession {
        self.native_session
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    /// The request a browser would send next: the cookies it would now
    /// hold and the same server-side session. Parameters, headers and format
    /// are not carried over.
    pub fn follow_up(&self) -> HostRequest {
        let mut next = HostRequest::new();
        for cookie in self.cookies.iter() {
            next.cookies.add_original(Cookie::new(
                cookie.name().to_string(),
                cookie.value().to_string(),
            ));
        }
        next.native_session =
            NativeSession::from_values(self.native_session.values.clone());
        next.remote_ip = self.remote_ip;
        next
    }
}
