use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::identity::MagicState;
use crate::transport::TransportKind;

/// Transports tried when restoring a session, highest priority first.
pub const DEFAULT_TRANSPORT_ORDER: [TransportKind; 4] = [
    TransportKind::Params,
    TransportKind::Cookie,
    TransportKind::NativeSession,
    TransportKind::HttpAuth,
];

/// Guard order for record states.
pub const DEFAULT_MAGIC_STATES: [MagicState; 3] =
    [MagicState::Active, MagicState::Approved, MagicState::Confirmed];

/// Formats for which single access tokens are accepted by default.
pub const DEFAULT_SINGLE_ACCESS_FORMATS: [&str; 2] =
    ["application/rss+xml", "application/atom+xml"];

/// `SameSite` attribute written on the credentials cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    /// Sent on same-site requests only.
    Strict,
    /// Also sent on top-level cross-site navigations.
    Lax,
    /// Sent everywhere; browsers require `secure` with it.
    None,
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(value: SameSitePolicy) -> Self {
        match value {
            SameSitePolicy::Strict => cookie::SameSite::Strict,
            SameSitePolicy::Lax => cookie::SameSite::Lax,
            SameSitePolicy::None => cookie::SameSite::None,
        }
    }
}

/// Credentials cookie attributes and remember-me policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    /// Overrides the default `<scope>_credentials` name.
    pub key: Option<String>,
    /// Cookie `Domain`; host-only when unset.
    pub domain: Option<String>,
    /// Cookie `Path`.
    pub path: String,
    /// Send the cookie over HTTPS only.
    pub secure: bool,
    /// Hide the cookie from scripts.
    pub http_only: bool,
    /// Cross-site sending policy.
    pub same_site: SameSitePolicy,
    /// Sign the cookie value so tampered cookies are ignored.
    pub sign: bool,
    /// Remember password logins by default.
    pub remember_me: bool,
    /// Lifetime of a remembered login, enforced on the stored token.
    pub remember_me_for: Duration,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            key: None,
            domain: None,
            path: "/".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSitePolicy::Lax,
            sign: false,
            remember_me: false,
            remember_me_for: Duration::days(90),
        }
    }
}

/// Request formats for which single access tokens may authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleAccessAllowed {
    /// Any request, including ones without a format.
    All,
    /// Only requests with one of these formats.
    Formats(Vec<String>),
    /// Single access tokens are never read.
    Never,
}

impl SingleAccessAllowed {
    /// Whether a request of `format` may use a single access token.
    pub fn permits(&self, format: Option<&str>) -> bool {
        match self {
            SingleAccessAllowed::All => true,
            SingleAccessAllowed::Never => false,
            SingleAccessAllowed::Formats(formats) => format.is_some_and(
                |format| formats.iter().any(|allowed| allowed == format),
            ),
        }
    }
}

impl Default for SingleAccessAllowed {
    fn default() -> Self {
        SingleAccessAllowed::Formats(
            DEFAULT_SINGLE_ACCESS_FORMATS
                .iter()
                .map(|format| format.to_string())
                .collect(),
        )
    }
}

/// Query parameter transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamsSettings {
    /// Overrides the default `<scope>_credentials` parameter name.
    pub key: Option<String>,
    /// Formats for which single access tokens authenticate.
    pub single_access_allowed: SingleAccessAllowed,
}

/// Host session store transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSessionSettings {
    /// Overrides the default `<scope>_credentials` key prefix.
    pub key: Option<String>,
}

/// HTTP authentication transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAuthSettings {
    /// Read `Authorization: Basic` credentials.
    pub allow_basic: bool,
    /// Ask unauthenticated clients for basic credentials.
    pub request_basic: bool,
    /// Realm named in the challenge.
    pub realm: String,
}

impl Default for HttpAuthSettings {
    fn default() -> Self {
        Self {
            allow_basic: true,
            request_basic: false,
            realm: "Application".to_string(),
        }
    }
}

/// Consecutive failed password attempts allowed before the login is locked
/// for `ban_for`. A `limit` of zero disables protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteForceSettings {
    /// Failures tolerated before lockout.
    pub limit: u32,
    /// Lockout window, extended by each further failure.
    pub ban_for: Duration,
}

impl BruteForceSettings {
    /// Settings that never lock a login out.
    pub fn disabled() -> Self {
        Self {
            limit: 0,
            ban_for: Duration::zero(),
        }
    }

    /// Whether failures are counted at all.
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Whether `failures` reaches the limit.
    pub fn is_exceeded(&self, failures: u32) -> bool {
        self.is_enabled() && failures >= self.limit
    }
}

impl Default for BruteForceSettings {
    fn default() -> Self {
        Self {
            limit: 50,
            ban_for: Duration::hours(2),
        }
    }
}

/// Configuration of one session scope.
///
/// Registered once in a [`ScopeRegistry`](super::ScopeRegistry); it can no
/// longer be replaced after the first session of the scope is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Scope name; also the prefix of transport keys.
    pub name: String,
    /// Name under which hosts expose the resolved record (`user`, `admin`).
    pub record_name: String,
    /// Inactive scopes refuse to construct sessions.
    pub active: bool,
    /// Enabled transports in priority order.
    pub transports: Vec<TransportKind>,
    /// Inactivity window for persisted sessions. `None` disables timeouts.
    pub timeout: Option<Duration>,
    /// Failed login protection.
    pub brute_force: BruteForceSettings,
    /// Cookie transport settings.
    pub cookie: CookieSettings,
    /// Query parameter transport settings.
    pub params: ParamsSettings,
    /// Host session store transport settings.
    pub native_session: NativeSessionSettings,
    /// HTTP authentication transport settings.
    pub http_auth: HttpAuthSettings,
    /// Record states checked by the built-in guard, in order.
    pub magic_states: Vec<MagicState>,
    /// Report unknown logins as invalid credentials.
    pub generalize_credential_errors: bool,
    /// Replace the persistence token on every restore.
    pub rotate_persistence_token: bool,
    /// Freshness window of perishable tokens, from issue time.
    pub perishable_token_valid_for: Duration,
    /// Revoke the record's perishable token on every password login.
    pub maintain_perishable_token: bool,
    /// Minimum age of `last_request_at` before request activity is recorded
    /// again.
    pub last_request_at_threshold: Duration,
}

impl ScopeConfig {
    /// Defaults for a scope named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            record_name: name.clone(),
            name,
            active: true,
            transports: DEFAULT_TRANSPORT_ORDER.to_vec(),
            timeout: None,
            brute_force: BruteForceSettings::default(),
            cookie: CookieSettings::default(),
            params: ParamsSettings::default(),
            native_session: NativeSessionSettings::default(),
            http_auth: HttpAuthSettings::default(),
            magic_states: DEFAULT_MAGIC_STATES.to_vec(),
            generalize_credential_errors: true,
            rotate_persistence_token: false,
            perishable_token_valid_for: Duration::minutes(10),
            maintain_perishable_token: true,
            last_request_at_threshold: Duration::zero(),
        }
    }

    /// Name hosts expose the record under.
    #[must_use]
    pub fn with_record_name(mut self, record_name: impl Into<String>) -> Self {
        self.record_name = record_name.into();
        self
    }

    /// Switch the scope on or off.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Enabled transports, highest priority first.
    #[must_use]
    pub fn with_transports(
        mut self,
        transports: impl IntoIterator<Item = TransportKind>,
    ) -> Self {
        self.transports = transports.into_iter().collect();
        self
    }

    /// Expire persisted sessions idle longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lock a login for `ban_for` after `limit` consecutive failures.
    #[must_use]
    pub fn with_brute_force(mut self, limit: u32, ban_for: Duration) -> Self {
        self.brute_force = BruteForceSettings { limit, ban_for };
        self
    }

    /// Cookie transport settings.
    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieSettings) -> Self {
        self.cookie = cookie;
        self
    }

    /// Formats for which single access tokens authenticate.
    #[must_use]
    pub fn with_single_access_allowed(
        mut self,
        allowed: SingleAccessAllowed,
    ) -> Self {
        self.params.single_access_allowed = allowed;
        self
    }

    /// HTTP authentication transport settings.
    #[must_use]
    pub fn with_http_auth(mut self, http_auth: HttpAuthSettings) -> Self {
        self.http_auth = http_auth;
        self
    }

    /// Record states the built-in guard checks.
    #[must_use]
    pub fn with_magic_states(
        mut self,
        states: impl IntoIterator<Item = MagicState>,
    ) -> Self {
        self.magic_states = states.into_iter().collect();
        self
    }

    /// Report unknown logins as invalid credentials.
    #[must_use]
    pub fn with_generalized_credential_errors(mut self, enabled: bool) -> Self {
        self.generalize_credential_errors = enabled;
        self
    }

    /// Replace the persistence token on every restore.
    #[must_use]
    pub fn with_persistence_token_rotation(mut self, enabled: bool) -> Self {
        self.rotate_persistence_token = enabled;
        self
    }

    /// Freshness window of perishable tokens.
    #[must_use]
    pub fn with_perishable_token_valid_for(mut self, valid_for: Duration) -> Self {
        self.perishable_token_valid_for = valid_for;
        self
    }

    /// Minimum spacing between recorded request activity.
    #[must_use]
    pub fn with_last_request_at_threshold(mut self, threshold: Duration) -> Self {
        self.last_request_at_threshold = threshold;
        self
    }

    /// Whether `transport` is enabled for the scope.
    pub fn is_enabled(&self, transport: TransportKind) -> bool {
        self.transports.contains(&transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_order() {
        let config = ScopeConfig::new("user");
        assert_eq!(config.transports, DEFAULT_TRANSPORT_ORDER.to_vec());
        assert_eq!(config.record_name, "user");
        assert!(config.active);
        assert!(config.timeout.is_none());
        assert_eq!(config.brute_force.limit, 50);
        assert_eq!(config.cookie.remember_me_for, Duration::days(90));
    }

    #[test]
    fn single_access_formats() {
        let allowed = SingleAccessAllowed::default();
        assert!(allowed.permits(Some("application/rss+xml")));
        assert!(!allowed.permits(Some("text/html")));
        assert!(!allowed.permits(None));
        assert!(SingleAccessAllowed::All.permits(None));
        assert!(!SingleAccessAllowed::Never.permits(Some("application/rss+xml")));
    }

    #[test]
    fn brute_force_limit_zero_disables() {
        let disabled = BruteForceSettings::disabled();
        assert!(!disabled.is_exceeded(1000));
        let settings = BruteForceSettings {
            limit: 3,
            ban_for: Duration::minutes(5),
        };
        assert!(!settings.is_exceeded(2));
        assert!(settings.is_exceeded(3));
    }
}
