use latchkey_core::{RegistryError, UnknownTransport};
use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ConfigGuardRailError;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration `{value}` for {field}")]
    InvalidDuration {
        field: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("duration `{value}` for {field} is out of range")]
    DurationOutOfRange { field: String, value: String },
    #[error("invalid value `{value}` for {field}")]
    InvalidSetting { field: String, value: String },
    #[error("scope `{scope}` lists an unknown transport")]
    UnknownTransport {
        scope: String,
        #[source]
        source: UnknownTransport,
    },
    #[error("scope `{0}` is configured more than once")]
    DuplicateScope(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
