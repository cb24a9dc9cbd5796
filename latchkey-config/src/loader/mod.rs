pub mod error;

use latchkey_core::ScopeConfig;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{
    DEFAULT_CONFIG_LOCATIONS, DEFAULT_HOST, DEFAULT_PASSWORD_PEPPER,
    DEFAULT_PORT, DEFAULT_SCOPE, DEFAULT_TOKEN_KEY,
};
use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{AuthConfig, Config, ConfigMetadata, ServerConfig};
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Apply the `.env` file, read `LATCHKEY_*` variables and load.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Load using `env` in place of the process environment. `.env` files
    /// are not consulted.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(Path::new)
                .find(|candidate| candidate.exists())
            {
                Some(found) => found.to_path_buf(),
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;
        debug!(path = %path.display(), "loaded configuration file");

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if file_config.is_none() {
            warnings.push_with_hint(
                "No latchkey.toml detected; falling back to environment variables",
                "Pass --config or set LATCHKEY_CONFIG to point at a configuration file",
            );
        }

        let FileConfig {
            server: file_server,
            auth: file_auth,
            scopes: file_scopes,
            dev_mode: file_dev_mode,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let auth = AuthConfig {
            password_pepper: env
                .password_pepper
                .or(file_auth.password_pepper)
                .unwrap_or_else(|| DEFAULT_PASSWORD_PEPPER.to_string()),
            token_key: env
                .token_key
                .or(file_auth.token_key)
                .unwrap_or_else(|| DEFAULT_TOKEN_KEY.to_string()),
        };

        let mut seen = HashSet::new();
        let mut scopes = Vec::with_capacity(file_scopes.len());
        for file_scope in file_scopes {
            let scope = file_scope.into_scope_config()?;
            if !seen.insert(scope.name.clone()) {
                return Err(ConfigLoadError::DuplicateScope(scope.name));
            }
            scopes.push(scope);
        }

        let default_scope = scopes.is_empty();
        if default_scope {
            warnings.push_with_hint(
                format!("No scopes configured; using the default `{DEFAULT_SCOPE}` scope"),
                "Add a [[scopes]] table to the configuration file",
            );
            scopes.push(ScopeConfig::new(DEFAULT_SCOPE));
        }

        let config = Config {
            server,
            auth,
            scopes,
            dev_mode: env.dev_mode.or(file_dev_mode).unwrap_or(false),
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
                default_scope,
            },
        };

        // Surfaces empty names and duplicate transports before startup.
        config.build_registry()?;

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
