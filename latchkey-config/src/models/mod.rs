pub mod sources;

use latchkey_core::{
    AuthCrypto, AuthCryptoError, RegistryError, ScopeConfig, ScopeRegistry,
};
use std::path::PathBuf;

use crate::constants::{DEFAULT_PASSWORD_PEPPER, DEFAULT_TOKEN_KEY};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub scopes: Vec<ScopeConfig>,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Register every configured scope in a fresh registry.
    pub fn build_registry(&self) -> Result<ScopeRegistry, RegistryError> {
        let registry = ScopeRegistry::new();
        for scope in &self.scopes {
            registry.register(scope.clone())?;
        }
        Ok(registry)
    }

    pub fn build_crypto(&self) -> Result<AuthCrypto, AuthCryptoError> {
        AuthCrypto::new(&self.auth.password_pepper, &self.auth.token_key)
    }

    pub fn scope(&self, name: &str) -> Option<&ScopeConfig> {
        self.scopes.iter().find(|scope| scope.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub password_pepper: String,
    pub token_key: String,
}

impl AuthConfig {
    pub fn is_default_pepper(&self) -> bool {
        self.password_pepper == DEFAULT_PASSWORD_PEPPER
    }

    pub fn is_default_token_key(&self) -> bool {
        self.token_key == DEFAULT_TOKEN_KEY
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password_pepper", &"<redacted>")
            .field("token_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    /// No scopes were configured and the default one was created.
    pub default_scope: bool,
}
