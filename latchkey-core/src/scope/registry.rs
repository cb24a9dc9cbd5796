use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

use super::config::ScopeConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("scope name must not be empty")]
    EmptyScopeName,

    #[error("scope `{scope}` lists transport `{transport}` more than once")]
    DuplicateTransport { scope: String, transport: String },

    #[error(
        "scope `{0}` is already in use and its configuration can no longer change"
    )]
    ScopeFrozen(String),

    #[error("unknown session scope `{0}`")]
    UnknownScope(String),
}

/// Transport keys for one scope, optionally prefixed by a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportKeys {
    pub cookie: String,
    pub native_session: String,
    pub params: String,
}

impl TransportKeys {
    fn for_config(config: &ScopeConfig) -> Self {
        let base = format!("{}_credentials", config.name);
        Self {
            cookie: config.cookie.key.clone().unwrap_or_else(|| base.clone()),
            native_session: config
                .native_session
                .key
                .clone()
                .unwrap_or_else(|| base.clone()),
            params: config.params.key.clone().unwrap_or(base),
        }
    }

    /// Keys for a session constructed with an explicit id.
    pub fn with_id(&self, id: Option<&str>) -> Self {
        match id {
            None => self.clone(),
            Some(id) => Self {
                cookie: format!("{id}_{}", self.cookie),
                native_session: format!("{id}_{}", self.native_session),
                params: format!("{id}_{}", self.params),
            },
        }
    }

    /// Native session key holding the record id.
    pub fn native_session_id(&self) -> String {
        format!("{}_id", self.native_session)
    }
}

/// Derived per-scope state, computed once on first use.
#[derive(Debug, Clone)]
pub struct ScopeRuntime {
    pub keys: TransportKeys,
}

/// A registered scope: frozen configuration plus its process-wide switches
/// and counters.
#[derive(Debug)]
pub struct ScopeHandle {
    config: ScopeConfig,
    active: AtomicBool,
    runtime: OnceLock<ScopeRuntime>,
    instances: AtomicU64,
}

impl ScopeHandle {
    fn new(config: ScopeConfig) -> Self {
        Self {
            active: AtomicBool::new(config.active),
            config,
            runtime: OnceLock::new(),
            instances: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Whether the one-time configuration latch has fired.
    pub fn is_configured(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// Derived state, initialized exactly once.
    pub fn runtime(&self) -> &ScopeRuntime {
        self.runtime.get_or_init(|| {
            debug!(scope = %self.config.name, "configuring session scope");
            ScopeRuntime {
                keys: TransportKeys::for_config(&self.config),
            }
        })
    }

    /// Next instance number for this scope, starting at 1.
    pub fn next_instance(&self) -> u64 {
        self.instances.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Process-wide mapping from scope name to configuration.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<HashMap<String, Arc<ScopeHandle>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_scope(self, config: ScopeConfig) -> Result<Self, RegistryError> {
        self.register(config)?;
        Ok(self)
    }

    /// Register or replace a scope. Fails once the scope has served a
    /// session.
    pub fn register(&self, config: ScopeConfig) -> Result<(), RegistryError> {
        validate(&config)?;

        let mut scopes = self.scopes.write();
        if let Some(existing) = scopes.get(&config.name)
            && existing.is_configured()
        {
            return Err(RegistryError::ScopeFrozen(config.name));
        }

        debug!(
            scope = %config.name,
            transports = ?config.transports,
            "registered session scope"
        );
        scopes.insert(config.name.clone(), Arc::new(ScopeHandle::new(config)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScopeHandle>> {
        self.scopes.read().get(name).cloned()
    }

    /// Flip the activation switch of a scope.
    pub fn set_active(
        &self,
        name: &str,
        active: bool,
    ) -> Result<(), RegistryError> {
        let handle = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownScope(name.to_string()))?;
        handle.set_active(active);
        Ok(())
    }

    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn validate(config: &ScopeConfig) -> Result<(), RegistryError> {
    if config.name.trim().is_empty() {
        return Err(RegistryError::EmptyScopeName);
    }

    let mut seen = HashSet::new();
    for transport in &config.transports {
        if !seen.insert(*transport) {
            return Err(RegistryError::DuplicateTransport {
                scope: config.name.clone(),
                transport: transport.to_string(),
            });
        }
    }
    Ok(())
}
