//! Binding modules: every handler of one extension, loaded as a unit.
//!
//! A module has a serializable half ([`ModuleManifest`], one
//! [`HandlerSpec`] per command, persisted next to the tree artifact) and a
//! live half (handler objects and availability predicates).

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    ribbon_extensions::{CommandKind, ScriptLanguage},
    serde::{Deserialize, Serialize},
};

use crate::{
    availability::{Availability, HostState},
    handler::CommandHandler,
};

/// What a handler dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum HandlerTarget {
    Script {
        path: PathBuf,
        language: ScriptLanguage,
    },
    Url {
        url: String,
    },
    Host {
        assembly: Option<String>,
        command_class: Option<String>,
        path: Option<PathBuf>,
    },
}

/// Everything needed to rebuild one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub unique_id: String,
    pub kind: CommandKind,
    pub target: HandlerTarget,
    #[serde(default)]
    pub config_script_path: Option<PathBuf>,
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

/// Serialized form of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub format_version: u32,
    pub extension: String,
    pub dir_hash: String,
    pub key: String,
    pub handlers: BTreeMap<String, HandlerSpec>,
}

impl ModuleManifest {
    pub fn read(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read(path).map_err(|e| crate::Error::io_at(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// How a module came to be for this load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOrigin {
    /// Synthesized from the tree and written to disk.
    Generated,
    /// Rebuilt from an artifact written by an earlier process.
    Disk,
    /// Already resident in this process; updated in place.
    Resident,
}

/// A command whose handler could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingFailure {
    pub unique_id: String,
    pub reason: String,
}

pub(crate) struct BoundCommand {
    pub spec: HandlerSpec,
    pub handler: Arc<dyn CommandHandler>,
    pub availability: Availability,
}

/// Live handlers of one extension.
pub struct BindingModule {
    pub(crate) extension: String,
    pub(crate) dir_hash: String,
    pub(crate) key: String,
    pub(crate) commands: HashMap<String, BoundCommand>,
}

impl std::fmt::Debug for BindingModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingModule")
            .field("extension", &self.extension)
            .field("key", &self.key)
            .field("handlers", &self.commands.len())
            .finish()
    }
}

impl BindingModule {
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn dir_hash(&self) -> &str {
        &self.dir_hash
    }

    /// Artifact key the module was built for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.commands.contains_key(unique_id)
    }

    /// Bound unique ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn handler(&self, unique_id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.get(unique_id).map(|c| Arc::clone(&c.handler))
    }

    pub fn spec(&self, unique_id: &str) -> Option<&HandlerSpec> {
        self.commands.get(unique_id).map(|c| &c.spec)
    }

    /// The predicate unit, for commands that declare one.
    pub fn predicate(&self, unique_id: &str) -> Option<&Availability> {
        self.commands
            .get(unique_id)
            .map(|c| &c.availability)
            .filter(|a| a.needs_predicate())
    }

    /// Whether the command should be enabled. Unknown ids are not.
    pub fn is_available(&self, unique_id: &str, state: &HostState) -> bool {
        self.commands
            .get(unique_id)
            .is_some_and(|c| c.availability.is_available(state))
    }

    pub fn manifest(&self) -> ModuleManifest {
        ModuleManifest {
            format_version: ribbon_cache::FORMAT_VERSION,
            extension: self.extension.clone(),
            dir_hash: self.dir_hash.clone(),
            key: self.key.clone(),
            handlers: self
                .commands
                .iter()
                .map(|(id, c)| (id.clone(), c.spec.clone()))
                .collect(),
        }
    }
}
