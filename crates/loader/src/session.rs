//! Session Orchestrator: runs discovery, cache, parse, binding and
//! materialization for every extension, isolating failures per extension.
//!
//! A reload runs in two phases. The first builds trees and binding modules
//! extension by extension; the second commits the resident modules and the
//! UI in one step under the UI lock. Passes are serialized, and a pass that
//! sees a newer reload request stops between extensions, commits what it
//! finished and skips UI cleanup.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    ribbon_bindings::{
        BindingGenerator, BindingModule, ExecutionOutcome, HostState, Invocation, ModuleRegistry,
    },
    ribbon_cache::{CacheStore, dir_hash},
    ribbon_common::SessionContext,
    ribbon_config::RibbonConfig,
    ribbon_extensions::{
        Extension, ExtensionDiscoverer, ExtensionInfo, ExtensionKind, FsExtensionDiscoverer,
        parse_with_report, refresh_icons,
    },
    ribbon_ui::{HostUi, MaterializeOptions, Materializer},
    tokio::sync::{Mutex, RwLock},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    startup::run_startup,
    summary::{ExtensionReport, ExtensionStatus, LoadSummary, LoadedReport, Stage},
};

/// An extension that made it through the first phase.
struct Staged {
    extension: Extension,
    module: Arc<BindingModule>,
    report: LoadedReport,
}

pub struct Session<H: HostUi> {
    config: Arc<RibbonConfig>,
    discoverer: Arc<dyn ExtensionDiscoverer>,
    cache: Option<CacheStore>,
    generator: BindingGenerator,
    modules: ModuleRegistry,
    ui: Mutex<Materializer<H>>,
    trees: RwLock<Vec<Extension>>,
    host_state: RwLock<HostState>,
    context: SessionContext,
    generation: AtomicU64,
    pass: Mutex<()>,
}

impl<H: HostUi> Session<H> {
    pub fn new(config: RibbonConfig, host: H) -> Self {
        let context = SessionContext::new(config.session.debug, config.session.values.clone());
        Self {
            discoverer: Arc::new(FsExtensionDiscoverer::from_config(&config)),
            cache: config.cache.enabled.then(|| CacheStore::from_config(&config)),
            generator: BindingGenerator::new(&config),
            modules: ModuleRegistry::new(),
            ui: Mutex::new(Materializer::new(host, MaterializeOptions::from_config(&config))),
            trees: RwLock::new(Vec::new()),
            host_state: RwLock::new(HostState::default()),
            context,
            generation: AtomicU64::new(0),
            pass: Mutex::new(()),
            config: Arc::new(config),
        }
    }

    pub fn with_discoverer(mut self, discoverer: Arc<dyn ExtensionDiscoverer>) -> Self {
        self.discoverer = discoverer;
        self
    }

    pub fn with_cache(mut self, cache: Option<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_generator(mut self, generator: BindingGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &RibbonConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Run `f` against the materializer (and through it, the host).
    pub async fn with_ui<R>(&self, f: impl FnOnce(&mut Materializer<H>) -> R) -> R {
        f(&mut *self.ui.lock().await)
    }

    /// Trees committed by the last pass.
    pub async fn extensions(&self) -> Vec<Extension> {
        self.trees.read().await.clone()
    }

    pub async fn extension(&self, name: &str) -> Option<Extension> {
        self.trees
            .read()
            .await
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Ask any running pass to stop after its current extension.
    pub fn supersede(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Run the full pipeline for every discovered extension.
    pub async fn reload(&self) -> Result<LoadSummary> {
        let generation = self.supersede();
        let _pass = self.pass.lock().await;
        let mut summary = LoadSummary {
            generation,
            ..Default::default()
        };
        if !self.is_current(generation) {
            debug!(generation, "reload superseded before it started");
            summary.superseded = true;
            return Ok(summary);
        }

        let infos = self
            .discoverer
            .discover()
            .await
            .map_err(Error::discovery)?;
        let (libraries, ui_extensions): (Vec<_>, Vec<_>) = infos
            .into_iter()
            .partition(|i| i.kind == ExtensionKind::Library);

        let mut library_paths: Vec<PathBuf> = libraries.iter().map(|l| l.directory.clone()).collect();
        library_paths.extend(self.config.extensions.library_paths.iter().cloned());
        summary.libraries = libraries.iter().map(|l| l.name.clone()).collect();
        info!(
            generation,
            extensions = ui_extensions.len(),
            libraries = libraries.len(),
            "reload started"
        );

        let mut staged = Vec::new();
        for info in ui_extensions {
            if !self.is_current(generation) {
                summary.superseded = true;
                summary.extensions.push(ExtensionReport {
                    name: info.name,
                    directory: info.directory,
                    status: ExtensionStatus::Abandoned,
                });
                continue;
            }
            if !info.enabled || !self.config.is_extension_enabled(&info.name) {
                debug!(extension = %info.name, "disabled, skipped");
                summary.extensions.push(ExtensionReport {
                    name: info.name,
                    directory: info.directory,
                    status: ExtensionStatus::Disabled,
                });
                continue;
            }
            match self.stage(info.clone(), &library_paths).await {
                Ok(done) => staged.push(done),
                Err((stage, e)) => {
                    error!(extension = %info.name, stage = %stage, error = %e, "extension failed to load");
                    summary.extensions.push(ExtensionReport {
                        name: info.name,
                        directory: info.directory,
                        status: ExtensionStatus::Failed {
                            stage,
                            error: e.to_string(),
                        },
                    });
                },
            }
        }

        self.commit(staged, &mut summary).await;
        info!(
            generation,
            loaded = summary.loaded().count(),
            failed = summary.failed().count(),
            superseded = summary.superseded,
            "reload finished"
        );
        Ok(summary)
    }

    /// First phase for one extension: tree, then bindings.
    async fn stage(
        &self,
        mut info: ExtensionInfo,
        library_paths: &[PathBuf],
    ) -> std::result::Result<Staged, (Stage, Error)> {
        let directory = info.directory.clone();
        info.dir_hash = tokio::task::spawn_blocking(move || dir_hash(&directory))
            .await
            .map_err(|e| (Stage::Hash, Error::task(e)))?
            .map_err(|e| (Stage::Hash, e.into()))?;

        let (mut extension, from_cache, parse_diagnostics) = self
            .tree(&info)
            .await
            .map_err(|e| (Stage::Parse, e))?;
        extension.enabled = true;
        extension.library_paths = library_paths.to_vec();

        let mut dropped = extension.drop_missing_scripts();
        for id in &dropped {
            warn!(extension = %extension.name, command = %id, "script missing, command dropped");
        }

        let resident = self.modules.get(&extension.name).await;
        let outcome = self
            .generator
            .generate(&extension, resident)
            .await
            .map_err(|e| (Stage::Bind, e.into()))?;
        let failed: HashSet<String> = outcome
            .failures
            .iter()
            .map(|f| f.unique_id.clone())
            .collect();
        dropped.extend(extension.remove_commands(&failed));

        match run_startup(&extension, &self.config, &self.context).await {
            Ok(Some(_)) => debug!(extension = %extension.name, "startup script ran"),
            Ok(None) => {},
            Err(e) => warn!(extension = %extension.name, error = %e, "startup script failed"),
        }

        let report = LoadedReport {
            dir_hash: info.dir_hash.clone(),
            from_cache,
            origin: outcome.origin,
            commands: extension.commands().len(),
            parse_diagnostics,
            dropped,
            reconcile: outcome.stats,
            ui: Default::default(),
        };
        Ok(Staged {
            extension,
            module: outcome.module,
            report,
        })
    }

    /// Cached tree when valid, else a fresh parse (saved back to the cache).
    async fn tree(&self, info: &ExtensionInfo) -> Result<(Extension, bool, usize)> {
        let cache = self.cache.clone();
        let info = info.clone();
        tokio::task::spawn_blocking(move || -> Result<(Extension, bool, usize)> {
            if let Some(cache) = &cache {
                match cache.load(&info) {
                    Ok(mut extension) => {
                        refresh_icons(&mut extension);
                        return Ok((extension, true, 0));
                    },
                    Err(e) => debug!(extension = %info.name, reason = %e, "cache miss, parsing"),
                }
            }
            let report = parse_with_report(&info.directory)?;
            for diagnostic in &report.diagnostics {
                debug!(extension = %info.name, %diagnostic, "parse diagnostic");
            }
            let mut extension = report.extension;
            extension.dir_hash = info.dir_hash.clone();
            if let Some(cache) = &cache {
                cache.save_or_warn(&extension);
            }
            Ok((extension, false, report.diagnostics.len()))
        })
        .await
        .map_err(Error::task)?
    }

    /// Second phase: resident modules, UI and cleanup under one lock.
    async fn commit(&self, staged: Vec<Staged>, summary: &mut LoadSummary) {
        let mut ui = self.ui.lock().await;
        let state = self.host_state.read().await.clone();

        let loaded: HashSet<&str> = staged.iter().map(|s| s.extension.name.as_str()).collect();
        let stale: Vec<String> = if summary.superseded {
            Vec::new()
        } else {
            self.modules
                .extensions()
                .await
                .into_iter()
                .filter(|name| !loaded.contains(name.as_str()))
                .collect()
        };
        self.modules
            .commit(staged.iter().map(|s| Arc::clone(&s.module)).collect(), &stale)
            .await;

        ui.begin_pass();
        let mut trees = Vec::with_capacity(staged.len());
        for Staged {
            extension,
            module,
            mut report,
        } in staged
        {
            report.ui = ui.materialize(&extension, &module, &state);
            summary.extensions.push(ExtensionReport {
                name: extension.name.clone(),
                directory: extension.directory.clone(),
                status: ExtensionStatus::Loaded(Box::new(report)),
            });
            trees.push(extension);
        }
        if !summary.superseded {
            summary.removed_elements = ui.cleanup(&stale);
            *self.trees.write().await = trees;
        } else {
            let mut current = self.trees.write().await;
            for tree in trees {
                match current.iter_mut().find(|t| t.name == tree.name) {
                    Some(slot) => *slot = tree,
                    None => current.push(tree),
                }
            }
        }
    }

    pub async fn host_state(&self) -> HostState {
        self.host_state.read().await.clone()
    }

    /// Record new host state and refresh every button's enabled state.
    pub async fn set_host_state(&self, state: HostState) {
        let mut ui = self.ui.lock().await;
        for name in self.modules.extensions().await {
            if let Some(module) = self.modules.get(&name).await {
                ui.apply_availability(&module, &state);
            }
        }
        *self.host_state.write().await = state;
    }

    pub async fn is_available(&self, unique_id: &str) -> bool {
        let state = self.host_state.read().await;
        match self.modules.module_for(unique_id).await {
            Some(module) => module.is_available(unique_id, &state),
            None => false,
        }
    }

    /// Invoke a bound command with the session context.
    pub async fn invoke(&self, unique_id: &str, arguments: Vec<String>) -> Result<ExecutionOutcome> {
        let handler = self
            .modules
            .handler(unique_id)
            .await
            .ok_or_else(|| Error::unknown_command(unique_id))?;
        let invocation = Invocation {
            context: self.context.clone(),
            arguments,
        };
        Ok(handler.execute(&invocation).await?)
    }

    /// Invoke a command's configure entry point.
    pub async fn configure(&self, unique_id: &str, arguments: Vec<String>) -> Result<ExecutionOutcome> {
        let handler = self
            .modules
            .handler(unique_id)
            .await
            .ok_or_else(|| Error::unknown_command(unique_id))?;
        let invocation = Invocation {
            context: self.context.clone(),
            arguments,
        };
        Ok(handler.configure(&invocation).await?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ribbon_ui::HeadlessUi,
        std::{fs, path::Path},
    };

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn session(root: &Path) -> Session<HeadlessUi> {
        let mut config = RibbonConfig::default();
        config.extensions.search_paths = vec![root.join("exts")];
        config.cache.dir = Some(root.join("cache"));
        config.engines.insert("python".into(), ribbon_config::EngineConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo \"$RIBBON_COMMAND_ID\"".into()],
        });
        let generator = BindingGenerator::new(&config)
            .with_artifact_dir(Some(root.join("cache")))
            .with_log_dir(None);
        Session::new(config, HeadlessUi::new()).with_generator(generator)
    }

    #[tokio::test]
    async fn queued_reload_supersedes_waiting_one() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join("exts/Ext.extension/T.tab/P.panel/Go.pushbutton/script.py"),
            "",
        );
        let session = Arc::new(session(tmp.path()));

        let guard = session.pass.lock().await;
        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.reload().await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.reload().await }
        });
        tokio::task::yield_now().await;
        drop(guard);

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert!(first.superseded);
        assert!(first.extensions.is_empty());
        assert!(!second.superseded);
        assert!(second.is_loaded("Ext"));
        assert_eq!(second.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn invoke_uses_session_context() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join("exts/Ext.extension/T.tab/P.panel/Go.pushbutton/script.py"),
            "",
        );
        let session = session(tmp.path());
        let summary = session.reload().await.unwrap();
        assert!(summary.is_loaded("Ext"));

        let out = session
            .invoke("Ext-T-P-Go-pushbutton", Vec::new())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "Ext-T-P-Go-pushbutton");
        assert!(matches!(
            session.invoke("nope", Vec::new()).await,
            Err(Error::UnknownCommand { .. })
        ));
        assert!(session.is_available("Ext-T-P-Go-pushbutton").await);
    }
}
