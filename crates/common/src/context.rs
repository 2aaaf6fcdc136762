//! Per-session context handed to every command invocation.
//!
//! One context is created when a session (or reload) starts. Handlers read
//! shared settings from it instead of reaching for process-wide state.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    uuid::Uuid,
};

/// Environment variable carrying the serialized context to script processes.
pub const CONTEXT_ENV_VAR: &str = "RIBBON_SESSION_CONTEXT";

/// Shared, cheaply clonable settings for one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    session_id: String,
    debug: bool,
    values: RwLock<BTreeMap<String, Value>>,
}

/// Serializable view of a [`SessionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub session_id: String,
    pub debug: bool,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl SessionContext {
    pub fn new(debug: bool, values: BTreeMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                session_id: Uuid::new_v4().to_string(),
                debug,
                values: RwLock::new(values),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn debug(&self) -> bool {
        self.inner.debug
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Set a value visible to every later reader in this session.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::debug!(%key, "session context value updated");
        self.inner
            .values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            session_id: self.inner.session_id.clone(),
            debug: self.inner.debug,
            values: self
                .inner
                .values
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    /// JSON form passed to script processes through [`CONTEXT_ENV_VAR`].
    pub fn to_env_value(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(false, BTreeMap::new())
    }
}
