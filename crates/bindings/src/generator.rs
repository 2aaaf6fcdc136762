//! Binding Generator: one handler per command, packaged per extension.
//!
//! Resolution order for a module: the resident module when its key still
//! matches, then an artifact written by an earlier process, then fresh
//! synthesis (written back to disk). A stored artifact is only used while
//! its specs equal the ones derived from the current tree; paths and
//! library roots are not part of the key, so a moved extension or a new
//! library rewrites it. Handlers whose spec did not change are carried over
//! from the resident module either way.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use {
    ribbon_cache::artifacts::{FORMAT_VERSION, artifact_key, artifact_path, remove_stale, write_atomic},
    ribbon_config::RibbonConfig,
    ribbon_extensions::{CommandKind, Component, ComponentKind, Extension},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    availability::Availability,
    error::{Error, Result},
    handler::{
        CommandHandler, HostHandler, HostInvoker, HostRequest, NoHostInvoker, ScriptHandler,
        UrlHandler, UrlOpener, system_url_opener,
    },
    module::{
        BindingFailure, BindingModule, BoundCommand, HandlerSpec, HandlerTarget, ModuleManifest,
        ModuleOrigin,
    },
};

pub const BINDINGS_SUFFIX: &str = ".bindings.json";

/// How many handlers were added, dropped or carried over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub added: usize,
    pub removed: usize,
    pub reused: usize,
}

#[derive(Debug)]
pub struct BindingOutcome {
    pub module: Arc<BindingModule>,
    pub origin: ModuleOrigin,
    /// Commands left without a handler; drop them before materializing.
    pub failures: Vec<BindingFailure>,
    pub stats: ReconcileStats,
}

#[derive(Clone)]
pub struct BindingGenerator {
    config: Arc<RibbonConfig>,
    /// `None` disables module artifacts.
    artifact_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    timeout: Duration,
    handler_timeout: Duration,
    invoker: Arc<dyn HostInvoker>,
    opener: UrlOpener,
}

impl BindingGenerator {
    pub fn new(config: &RibbonConfig) -> Self {
        Self {
            config: Arc::new(config.clone()),
            artifact_dir: config.cache.enabled.then(|| config.cache.resolved_dir()),
            log_dir: Some(ribbon_config::data_dir().join("logs")),
            timeout: Duration::from_secs(config.bindings.timeout_secs),
            handler_timeout: Duration::from_secs(config.bindings.handler_timeout_secs),
            invoker: Arc::new(NoHostInvoker),
            opener: system_url_opener(),
        }
    }

    pub fn with_artifact_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifact_dir = dir;
        self
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_host_invoker(mut self, invoker: Arc<dyn HostInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_url_opener(mut self, opener: UrlOpener) -> Self {
        self.opener = opener;
        self
    }

    fn key_for(&self, extension: &Extension) -> String {
        artifact_key(&self.config.host.runtime_hash, &extension.dir_hash)
    }

    /// Build (or reuse) the binding module for `extension`.
    ///
    /// Errors are fatal to this extension only; per-command problems come
    /// back as [`BindingOutcome::failures`].
    pub async fn generate(
        &self,
        extension: &Extension,
        resident: Option<Arc<BindingModule>>,
    ) -> Result<BindingOutcome> {
        let generator = self.clone();
        let ext = extension.clone();
        let name = extension.name.clone();

        let work = tokio::task::spawn_blocking(move || generator.build(&ext, resident.as_deref()));
        let outcome = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| Error::Timeout {
                extension: name.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| Error::Worker {
                extension: name.clone(),
                reason: e.to_string(),
            })??;

        info!(
            extension = %name,
            origin = ?outcome.origin,
            handlers = outcome.module.len(),
            failed = outcome.failures.len(),
            added = outcome.stats.added,
            removed = outcome.stats.removed,
            reused = outcome.stats.reused,
            "bindings ready"
        );
        Ok(outcome)
    }

    fn build(&self, extension: &Extension, resident: Option<&BindingModule>) -> Result<BindingOutcome> {
        let key = self.key_for(extension);
        let mut failures = Vec::new();

        let (specs, origin) = if let Some(module) = resident
            && module.key() == key
        {
            let (specs, synth_failures) = self.synthesize(extension);
            failures.extend(synth_failures);
            (specs, ModuleOrigin::Resident)
        } else if let Some(manifest) = self.load_artifact(extension, &key) {
            let (specs, synth_failures) = self.synthesize(extension);
            failures.extend(synth_failures);
            let outdated = specs
                .iter()
                .filter(|(id, spec)| manifest.handlers.get(*id) != Some(*spec))
                .count();
            if outdated == 0 && manifest.handlers.len() == specs.len() {
                (specs, ModuleOrigin::Disk)
            } else {
                debug!(
                    extension = %extension.name,
                    outdated,
                    "stored bindings disagree with the current tree, rewriting"
                );
                self.persist(extension, &key, &specs);
                (specs, ModuleOrigin::Generated)
            }
        } else {
            let (specs, synth_failures) = self.synthesize(extension);
            failures.extend(synth_failures);
            self.persist(extension, &key, &specs);
            (specs, ModuleOrigin::Generated)
        };

        let mut stats = ReconcileStats::default();
        let mut commands = HashMap::with_capacity(specs.len());
        for (id, spec) in specs {
            let reused = resident
                .and_then(|m| m.commands.get(&id))
                .filter(|bound| bound.spec == spec)
                .map(|bound| Arc::clone(&bound.handler));
            let handler = match reused {
                Some(handler) => {
                    stats.reused += 1;
                    handler
                },
                None => match self.build_handler(&spec) {
                    Ok(handler) => {
                        stats.added += 1;
                        handler
                    },
                    Err(e) => {
                        debug!(command = %id, error = %e, "handler not built");
                        failures.push(BindingFailure {
                            unique_id: id,
                            reason: e.to_string(),
                        });
                        continue;
                    },
                },
            };
            let availability = Availability::parse(spec.availability.as_deref());
            commands.insert(id, BoundCommand {
                spec,
                handler,
                availability,
            });
        }
        if let Some(module) = resident {
            stats.removed = module
                .commands
                .keys()
                .filter(|id| !commands.contains_key(*id))
                .count();
        }
        for failure in &failures {
            warn!(
                extension = %extension.name,
                command = %failure.unique_id,
                reason = %failure.reason,
                "command dropped: no handler"
            );
        }

        Ok(BindingOutcome {
            module: Arc::new(BindingModule {
                extension: extension.name.clone(),
                dir_hash: extension.dir_hash.clone(),
                key,
                commands,
            }),
            origin,
            failures,
            stats,
        })
    }

    /// Handler specs for every command in the tree.
    pub fn synthesize(
        &self,
        extension: &Extension,
    ) -> (BTreeMap<String, HandlerSpec>, Vec<BindingFailure>) {
        let mut specs = BTreeMap::new();
        let mut failures = Vec::new();
        for command in extension.commands() {
            match self.spec_for(extension, command) {
                Ok(spec) => {
                    specs.insert(command.unique_id.clone(), spec);
                },
                Err(reason) => failures.push(BindingFailure {
                    unique_id: command.unique_id.clone(),
                    reason,
                }),
            }
        }
        (specs, failures)
    }

    fn spec_for(
        &self,
        extension: &Extension,
        component: &Component,
    ) -> std::result::Result<HandlerSpec, String> {
        let ComponentKind::Command(kind) = component.kind else {
            return Err("not a command".into());
        };
        let command = component
            .command
            .as_ref()
            .ok_or_else(|| "command has no script".to_string())?;
        if !command.script_path.is_file() {
            return Err(format!(
                "script not found: {}",
                command.script_path.display()
            ));
        }

        let meta = &command.metadata;
        let host_target = || HandlerTarget::Host {
            assembly: meta.assembly.clone(),
            command_class: meta.command_class.clone(),
            path: None,
        };
        let target = match kind {
            CommandKind::Url => HandlerTarget::Url {
                url: meta
                    .hyperlink
                    .clone()
                    .ok_or_else(|| "url command without hyperlink".to_string())?,
            },
            CommandKind::Content => HandlerTarget::Host {
                assembly: None,
                command_class: None,
                path: Some(command.script_path.clone()),
            },
            CommandKind::Link | CommandKind::Invoke if !command.language.is_executable() => {
                if meta.assembly.is_none() && meta.command_class.is_none() {
                    return Err("link command without assembly or command class".into());
                }
                host_target()
            },
            _ if command.language.is_executable() => HandlerTarget::Script {
                path: command.script_path.clone(),
                language: command.language,
            },
            _ => {
                return Err(format!(
                    "{} commands cannot run {} files",
                    component.kind,
                    command.language.engine_key()
                ));
            },
        };

        Ok(HandlerSpec {
            unique_id: component.unique_id.clone(),
            kind,
            target,
            config_script_path: command.config_script_path.clone(),
            search_paths: extension.search_paths_for(command),
            options: meta.options.clone(),
            availability: command.availability.clone(),
            log_path: self
                .log_dir
                .as_ref()
                .map(|d| d.join(format!("{}.log", component.unique_id.replace('#', "_")))),
        })
    }

    fn build_handler(&self, spec: &HandlerSpec) -> Result<Arc<dyn CommandHandler>> {
        Ok(match &spec.target {
            HandlerTarget::Script { language, .. } => {
                let engine = self
                    .config
                    .engine_for(language.engine_key())
                    .ok_or_else(|| Error::no_engine(language.engine_key()))?;
                let handler = ScriptHandler::new(spec, engine, self.handler_timeout)
                    .map_err(|e| Error::no_engine(e.to_string()))?;
                Arc::new(handler)
            },
            HandlerTarget::Url { url } => Arc::new(UrlHandler::new(
                spec.unique_id.clone(),
                url.clone(),
                Arc::clone(&self.opener),
            )),
            HandlerTarget::Host {
                assembly,
                command_class,
                path,
            } => Arc::new(HostHandler::new(
                HostRequest {
                    unique_id: spec.unique_id.clone(),
                    assembly: assembly.clone(),
                    command_class: command_class.clone(),
                    path: path.clone(),
                },
                Arc::clone(&self.invoker),
            )),
        })
    }

    fn load_artifact(&self, extension: &Extension, key: &str) -> Option<ModuleManifest> {
        let dir = self.artifact_dir.as_ref()?;
        if extension.dir_hash.is_empty() {
            return None;
        }
        let path = artifact_path(dir, &extension.name, key, BINDINGS_SUFFIX);
        if !path.is_file() {
            return None;
        }
        match ModuleManifest::read(&path) {
            Ok(manifest)
                if manifest.format_version == FORMAT_VERSION
                    && manifest.key == key
                    && manifest.extension == extension.name =>
            {
                debug!(extension = %extension.name, path = %path.display(), "loaded stored bindings");
                Some(manifest)
            },
            Ok(_) => {
                debug!(path = %path.display(), "stored bindings do not match, regenerating");
                None
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable stored bindings, regenerating");
                None
            },
        }
    }

    fn persist(&self, extension: &Extension, key: &str, specs: &BTreeMap<String, HandlerSpec>) {
        let Some(dir) = &self.artifact_dir else {
            return;
        };
        if extension.dir_hash.is_empty() {
            return;
        }
        let manifest = ModuleManifest {
            format_version: FORMAT_VERSION,
            extension: extension.name.clone(),
            dir_hash: extension.dir_hash.clone(),
            key: key.to_string(),
            handlers: specs.clone(),
        };
        let path = artifact_path(dir, &extension.name, key, BINDINGS_SUFFIX);
        let written = serde_json::to_vec_pretty(&manifest)
            .map_err(Error::from)
            .and_then(|data| write_atomic(&path, &data).map_err(Error::from));
        match written {
            Ok(()) => {
                remove_stale(dir, &extension.name, BINDINGS_SUFFIX, key);
            },
            Err(e) => {
                warn!(extension = %extension.name, error = %e, "failed to store bindings");
            },
        }
    }
}
