//! Configuration loading for Latchkey.
//!
//! Reads a TOML file, applies `.env` and `LATCHKEY_*` environment overrides,
//! checks the result against a few guard rails and turns the `[[scopes]]`
//! tables into [`ScopeConfig`](latchkey_core::ScopeConfig) values ready for a
//! [`ScopeRegistry`](latchkey_core::ScopeRegistry).

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::sources::{EnvConfig, FileConfig, FileScopeConfig};
pub use models::{AuthConfig, Config, ConfigMetadata, ServerConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
