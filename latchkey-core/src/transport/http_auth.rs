use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::{
    PasswordCredentials, Presented, Transport, TransportContext, TransportKind,
};
use crate::request::HostRequest;

const BASIC_SCHEME: &str = "Basic";

/// Login and password from an `Authorization: Basic` header. Other schemes
/// are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAuthTransport;

impl HttpAuthTransport {
    /// `WWW-Authenticate` value asking for basic credentials.
    pub fn challenge(realm: &str) -> String {
        format!("{BASIC_SCHEME} realm=\"{}\"", realm.replace('"', "'"))
    }
}

impl Transport for HttpAuthTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::HttpAuth
    }

    fn load(
        &self,
        ctx: &TransportContext<'_>,
        request: &HostRequest,
    ) -> Option<Presented> {
        if !ctx.config.http_auth.allow_basic {
            return None;
        }

        let header = request.authorization()?.trim();
        let (scheme, encoded) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
            debug!(scheme, "ignoring unsupported authorization scheme");
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (login, password) = decoded.split_once(':')?;

        Some(Presented::Password(PasswordCredentials::new(login, password)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{HttpAuthSettings, ScopeConfig};
    use crate::transport::test_support::{context, crypto, keys};

    fn load(config: &ScopeConfig, header: &str) -> Option<PasswordCredentials> {
        let keys = keys(config);
        let crypto = crypto();
        let ctx = context(config, &keys, &crypto);
        let request = HostRequest::new().with_authorization(header);
        match HttpAuthTransport.load(&ctx, &request)? {
            Presented::Password(credentials) => Some(credentials),
            Presented::Token(_) => None,
        }
    }

    #[test]
    fn decodes_basic_credentials() {
        let config = ScopeConfig::new("user");
        let header = format!("Basic {}", STANDARD.encode("alice:s3cr:et"));
        let credentials = load(&config, &header).unwrap();
        assert_eq!(credentials.login, "alice");
        assert_eq!(credentials.password.as_str(), "s3cr:et");
        assert!(!format!("{credentials:?}").contains("s3cr"));
    }

    #[test]
    fn ignores_other_schemes_and_disabled_basic() {
        let config = ScopeConfig::new("user");
        assert!(load(&config, "Digest username=\"alice\"").is_none());
        assert!(load(&config, "Bearer abc").is_none());
        assert!(load(&config, "Basic !!!").is_none());

        let disabled = ScopeConfig::new("user").with_http_auth(HttpAuthSettings {
            allow_basic: false,
            ..HttpAuthSettings::default()
        });
        let header = format!("Basic {}", STANDARD.encode("alice:pw"));
        assert!(load(&disabled, &header).is_none());
    }

    #[test]
    fn challenge_names_the_realm() {
        assert_eq!(
            HttpAuthTransport::challenge("Application"),
            "Basic realm=\"Application\""
        );
    }
}
