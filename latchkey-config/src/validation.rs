use latchkey_core::{ScopeConfig, TransportKind};
use thiserror::Error;

use crate::constants::MIN_SECRET_LENGTH;
use crate::models::{AuthConfig, Config};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("authentication secret {field} {reason}")]
    WeakSecret { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject unsafe secrets outside dev mode and warn about risky scope
/// settings.
pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.dev_mode {
        if config.auth.is_default_pepper() || config.auth.is_default_token_key()
        {
            warnings.push_with_hint(
                "Default authentication secrets in use",
                "Set LATCHKEY_PASSWORD_PEPPER and LATCHKEY_TOKEN_KEY before leaving dev mode",
            );
        }
    } else {
        enforce_secret(&config.auth)?;
    }

    for scope in &config.scopes {
        check_scope(scope, config.dev_mode, &mut warnings);
    }

    Ok(warnings)
}

fn enforce_secret(auth: &AuthConfig) -> Result<(), ConfigGuardRailError> {
    if auth.is_default_pepper() {
        return Err(ConfigGuardRailError::WeakSecret {
            field: "LATCHKEY_PASSWORD_PEPPER",
            reason: "uses the default placeholder value".into(),
        });
    }

    if auth.password_pepper.len() < MIN_SECRET_LENGTH {
        return Err(ConfigGuardRailError::WeakSecret {
            field: "LATCHKEY_PASSWORD_PEPPER",
            reason: format!("must be at least {MIN_SECRET_LENGTH} characters"),
        });
    }

    if auth.is_default_token_key() {
        return Err(ConfigGuardRailError::WeakSecret {
            field: "LATCHKEY_TOKEN_KEY",
            reason: "uses the default placeholder value".into(),
        });
    }

    if auth.token_key.len() < MIN_SECRET_LENGTH {
        return Err(ConfigGuardRailError::WeakSecret {
            field: "LATCHKEY_TOKEN_KEY",
            reason: format!("must be at least {MIN_SECRET_LENGTH} characters"),
        });
    }

    Ok(())
}

fn check_scope(scope: &ScopeConfig, dev_mode: bool, warnings: &mut ConfigWarnings) {
    let name = &scope.name;

    if scope.transports.is_empty() {
        warnings.push(format!(
            "Scope `{name}` enables no transports; sessions can only be built from explicit credentials"
        ));
    }

    if !scope.active {
        warnings.push(format!(
            "Scope `{name}` is deactivated; constructing its sessions will fail"
        ));
    }

    if !scope.brute_force.is_enabled() {
        warnings.push_with_hint(
            format!("Brute force protection is disabled for scope `{name}`"),
            "Set scopes.brute_force.limit to a positive number",
        );
    }

    if scope.http_auth.request_basic && !scope.is_enabled(TransportKind::HttpAuth)
    {
        warnings.push(format!(
            "Scope `{name}` requests basic auth but the http_auth transport is disabled"
        ));
    }

    if !dev_mode && scope.is_enabled(TransportKind::Cookie) && !scope.cookie.secure
    {
        warnings.push_with_hint(
            format!("Scope `{name}` sends its credentials cookie over plain HTTP"),
            "Set scopes.cookie.secure = true unless TLS is terminated elsewhere",
        );
    }
}
