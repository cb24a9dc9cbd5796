//! Session scopes: namespaced configuration and per-scope counters.

mod config;
mod registry;

pub use config::{
    BruteForceSettings, CookieSettings, DEFAULT_MAGIC_STATES,
    DEFAULT_SINGLE_ACCESS_FORMATS, DEFAULT_TRANSPORT_ORDER, HttpAuthSettings,
    NativeSessionSettings, ParamsSettings, SameSitePolicy, ScopeConfig,
    SingleAccessAllowed,
};
pub use registry::{
    RegistryError, ScopeHandle, ScopeRegistry, ScopeRuntime, TransportKeys,
};
