use latchkey_core::{
    BruteForceSettings, CookieSettings, HttpAuthSettings, MagicState,
    SameSitePolicy, ScopeConfig, SingleAccessAllowed, TransportKind,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::error::ConfigLoadError;
use crate::util::{non_empty_var, parse_bool_var, parse_duration};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub scopes: Vec<FileScopeConfig>,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_pepper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_key: Option<String>,
}

/// One `[[scopes]]` table. Absent fields keep the library defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileScopeConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Transport names in priority order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
    /// Human duration; `0s` disables the timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic_states: Option<Vec<MagicState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generalize_credential_errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate_persistence_token: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perishable_token_valid_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintain_perishable_token: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at_threshold: Option<String>,
    #[serde(default)]
    pub brute_force: FileBruteForceConfig,
    #[serde(default)]
    pub cookie: FileCookieConfig,
    #[serde(default)]
    pub params: FileParamsConfig,
    #[serde(default)]
    pub native_session: FileNativeSessionConfig,
    #[serde(default)]
    pub http_auth: FileHttpAuthConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBruteForceConfig {
    /// Consecutive failed logins allowed; `0` disables protection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_for: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCookieConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSitePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_me_for: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileParamsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_access_allowed: Option<FileSingleAccess>,
}

/// `"all"`, `"never"` or a list of request formats.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileSingleAccess {
    Keyword(String),
    Formats(Vec<String>),
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileNativeSessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileHttpAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_basic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_basic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl FileScopeConfig {
    /// Overlay the file values on the library defaults for this scope.
    pub fn into_scope_config(self) -> Result<ScopeConfig, ConfigLoadError> {
        let name = self.name.trim().to_string();
        let field = |suffix: &str| format!("scopes.{name}.{suffix}");
        let mut scope = ScopeConfig::new(name.clone());

        if let Some(record_name) = self.record_name {
            scope.record_name = record_name;
        }
        if let Some(active) = self.active {
            scope.active = active;
        }
        if let Some(transports) = self.transports {
            scope.transports = transports
                .iter()
                .map(|raw| {
                    raw.trim().parse::<TransportKind>().map_err(|source| {
                        ConfigLoadError::UnknownTransport {
                            scope: name.clone(),
                            source,
                        }
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = self.timeout {
            let timeout = parse_duration(&field("timeout"), &raw)?;
            scope.timeout = (!timeout.is_zero()).then_some(timeout);
        }
        if let Some(states) = self.magic_states {
            scope.magic_states = states;
        }
        if let Some(enabled) = self.generalize_credential_errors {
            scope.generalize_credential_errors = enabled;
        }
        if let Some(enabled) = self.rotate_persistence_token {
            scope.rotate_persistence_token = enabled;
        }
        if let Some(raw) = self.perishable_token_valid_for {
            scope.perishable_token_valid_for =
                parse_duration(&field("perishable_token_valid_for"), &raw)?;
        }
        if let Some(enabled) = self.maintain_perishable_token {
            scope.maintain_perishable_token = enabled;
        }
        if let Some(raw) = self.last_request_at_threshold {
            scope.last_request_at_threshold =
                parse_duration(&field("last_request_at_threshold"), &raw)?;
        }

        let defaults = BruteForceSettings::default();
        scope.brute_force = BruteForceSettings {
            limit: self.brute_force.limit.unwrap_or(defaults.limit),
            ban_for: match self.brute_force.ban_for {
                Some(raw) => parse_duration(&field("brute_force.ban_for"), &raw)?,
                None => defaults.ban_for,
            },
        };

        let cookie = self.cookie;
        let defaults = CookieSettings::default();
        scope.cookie = CookieSettings {
            key: cookie.key.or(defaults.key),
            domain: cookie.domain.or(defaults.domain),
            path: cookie.path.unwrap_or(defaults.path),
            secure: cookie.secure.unwrap_or(defaults.secure),
            http_only: cookie.http_only.unwrap_or(defaults.http_only),
            same_site: cookie.same_site.unwrap_or(defaults.same_site),
            sign: cookie.sign.unwrap_or(defaults.sign),
            remember_me: cookie.remember_me.unwrap_or(defaults.remember_me),
            remember_me_for: match cookie.remember_me_for {
                Some(raw) => {
                    parse_duration(&field("cookie.remember_me_for"), &raw)?
                }
                None => defaults.remember_me_for,
            },
        };

        scope.params.key = self.params.key;
        if let Some(allowed) = self.params.single_access_allowed {
            scope.params.single_access_allowed =
                single_access(&field("params.single_access_allowed"), allowed)?;
        }
        scope.native_session.key = self.native_session.key;

        let http_auth = self.http_auth;
        let defaults = HttpAuthSettings::default();
        scope.http_auth = HttpAuthSettings {
            allow_basic: http_auth.allow_basic.unwrap_or(defaults.allow_basic),
            request_basic: http_auth
                .request_basic
                .unwrap_or(defaults.request_basic),
            realm: http_auth.realm.unwrap_or(defaults.realm),
        };

        Ok(scope)
    }
}

fn single_access(
    field: &str,
    raw: FileSingleAccess,
) -> Result<SingleAccessAllowed, ConfigLoadError> {
    match raw {
        FileSingleAccess::Formats(formats) => {
            Ok(SingleAccessAllowed::Formats(formats))
        }
        FileSingleAccess::Keyword(keyword) => {
            match keyword.trim().to_ascii_lowercase().as_str() {
                "all" => Ok(SingleAccessAllowed::All),
                "never" | "none" => Ok(SingleAccessAllowed::Never),
                _ => Err(ConfigLoadError::InvalidSetting {
                    field: field.to_string(),
                    value: keyword,
                }),
            }
        }
    }
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub password_pepper: Option<String>,
    pub token_key: Option<String>,
    pub dev_mode: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("LATCHKEY_CONFIG").map(PathBuf::from),
            server_host: non_empty_var("LATCHKEY_HOST"),
            server_port: non_empty_var("LATCHKEY_PORT")
                .and_then(|s| s.parse().ok()),
            password_pepper: non_empty_var("LATCHKEY_PASSWORD_PEPPER"),
            token_key: non_empty_var("LATCHKEY_TOKEN_KEY"),
            dev_mode: parse_bool_var("LATCHKEY_DEV_MODE"),
        }
    }
}
