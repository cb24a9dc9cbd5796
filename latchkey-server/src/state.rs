use dashmap::DashMap;
use latchkey_core::{MemoryUser, MemoryUserStore, SessionPipeline};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Server-side storage behind the native session transport, keyed by the
/// `latchkey_sid` cookie.
#[derive(Debug, Default)]
pub struct NativeSessionStore {
    sessions: DashMap<String, HashMap<String, String>>,
}

impl NativeSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, sid: &str) -> Option<HashMap<String, String>> {
        self.sessions.get(sid).map(|entry| entry.value().clone())
    }

    pub fn store(&self, sid: impl Into<String>, values: HashMap<String, String>) {
        self.sessions.insert(sid.into(), values);
    }

    pub fn remove(&self, sid: &str) -> bool {
        self.sessions.remove(sid).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SessionPipeline<MemoryUser>,
    pub users: Arc<MemoryUserStore>,
    pub native_sessions: Arc<NativeSessionStore>,
}

impl AppState {
    pub fn new(
        pipeline: SessionPipeline<MemoryUser>,
        users: Arc<MemoryUserStore>,
    ) -> Self {
        Self {
            pipeline,
            users,
            native_sessions: Arc::new(NativeSessionStore::new()),
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("users", &self.users.len())
            .field("native_sessions", &self.native_sessions.len())
            .finish()
    }
}
