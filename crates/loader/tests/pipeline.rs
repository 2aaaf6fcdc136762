#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    ribbon_bindings::{BindingGenerator, HostState, ModuleOrigin},
    ribbon_config::{EngineConfig, RibbonConfig},
    ribbon_extensions::{ExtensionDiscoverer, ExtensionInfo, ExtensionKind, FsExtensionDiscoverer},
    ribbon_loader::{ExtensionStatus, Session, Stage},
    ribbon_ui::{ElementKind, HeadlessUi},
};

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(root: &Path) -> RibbonConfig {
    let mut config = RibbonConfig::default();
    config.host.runtime_hash = "it".into();
    config.extensions.search_paths = vec![root.join("exts")];
    config.cache.dir = Some(root.join("cache"));
    config.engines.insert("python".into(), EngineConfig {
        command: "sh".into(),
        args: vec!["-c".into(), "echo \"$RIBBON_SEARCH_PATHS\"".into()],
    });
    config
}

fn session_with(root: &Path, config: RibbonConfig) -> Session<HeadlessUi> {
    let generator = BindingGenerator::new(&config)
        .with_artifact_dir(Some(root.join("cache")))
        .with_log_dir(None);
    Session::new(config, HeadlessUi::new()).with_generator(generator)
}

fn session(root: &Path) -> Session<HeadlessUi> {
    session_with(root, config(root))
}

fn ext_root(root: &Path, name: &str) -> PathBuf {
    root.join("exts").join(format!("{name}.extension"))
}

async fn buttons(session: &Session<HeadlessUi>) -> Vec<String> {
    session
        .with_ui(|m| m.host().buttons().into_iter().map(str::to_string).collect())
        .await
}

async fn panel_children(session: &Session<HeadlessUi>, panel: &str) -> Vec<String> {
    session
        .with_ui(|m| m.host().children(Some(panel)).into_iter().map(str::to_string).collect())
        .await
}

async fn enabled(session: &Session<HeadlessUi>, unique_id: &str) -> bool {
    session
        .with_ui(|m| m.host().get(unique_id).is_some_and(|e| e.enabled))
        .await
}

#[tokio::test]
async fn basic_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let cmd = ext_root(tmp.path(), "Tools").join("MyTab.tab/MyPanel.panel/DoThing.pushbutton");
    write(&cmd.join("script.py"), "");
    write(&cmd.join("icon.png"), "png");

    let session = session(tmp.path());
    let summary = session.reload().await.unwrap();
    assert!(summary.is_loaded("Tools"));

    let ext = session.extension("Tools").await.unwrap();
    assert_eq!(ext.tabs().len(), 1);
    assert_eq!(ext.tabs()[0].name, "MyTab");
    assert_eq!(ext.tabs()[0].children[0].name, "MyPanel");
    let commands = ext.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].name, "DoThing");
    assert_eq!(
        commands[0].command.as_ref().unwrap().script_path,
        cmd.join("script.py")
    );
    assert_eq!(commands[0].icon_path(), Some(cmd.join("icon.png").as_path()));

    session
        .with_ui(|m| {
            let ui = m.host();
            assert_eq!(ui.buttons().len(), 1);
            let button = ui.get(ui.buttons()[0]).unwrap();
            assert_eq!(button.element.title, "DoThing");
            assert!(button.enabled);
            assert_eq!(ui.children(None).len(), 1);
        })
        .await;
}

#[tokio::test]
async fn second_run_reuses_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("A.pushbutton/script.py"), "");
    write(&panel.join("B.pushbutton/script.py"), "");

    let session = session(tmp.path());
    let first = session.reload().await.unwrap();
    let first = first.loaded_report("Tools").unwrap().clone();
    assert!(!first.from_cache);
    assert_eq!(first.origin, ModuleOrigin::Generated);

    let summary = session.reload().await.unwrap();
    let second = summary.loaded_report("Tools").unwrap();
    assert!(second.from_cache);
    assert_eq!(second.dir_hash, first.dir_hash);
    assert_eq!(second.origin, ModuleOrigin::Resident);
    assert_eq!(second.reconcile.reused, 2);
    assert_eq!(second.reconcile.added, 0);
    assert_eq!(second.ui.created, 0);
    assert!(summary.removed_elements.is_empty());
}

#[tokio::test]
async fn new_process_loads_stored_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("A.pushbutton/script.py"), "");
    session(tmp.path()).reload().await.unwrap();

    let fresh = session(tmp.path());
    let summary = fresh.reload().await.unwrap();
    let report = summary.loaded_report("Tools").unwrap();
    assert!(report.from_cache);
    assert_eq!(report.origin, ModuleOrigin::Disk);
    assert_eq!(buttons(&fresh).await, vec!["Tools-T-P-A-pushbutton"]);
}

#[tokio::test]
async fn icon_swap_keeps_cache_but_refreshes_icon() {
    let tmp = tempfile::tempdir().unwrap();
    let cmd = ext_root(tmp.path(), "Tools").join("T.tab/P.panel/A.pushbutton");
    write(&cmd.join("script.py"), "");
    write(&cmd.join("icon.png"), "one");

    let session = session(tmp.path());
    let first = session.reload().await.unwrap();
    let hash = first.loaded_report("Tools").unwrap().dir_hash.clone();

    fs::remove_file(cmd.join("icon.png")).unwrap();
    write(&cmd.join("A.png"), "two");
    let summary = session.reload().await.unwrap();
    let report = summary.loaded_report("Tools").unwrap();
    assert!(report.from_cache);
    assert_eq!(report.dir_hash, hash);

    let ext = session.extension("Tools").await.unwrap();
    assert_eq!(ext.commands()[0].icon_path(), Some(cmd.join("A.png").as_path()));
}

#[tokio::test]
async fn empty_stack_prunes_its_panel() {
    let tmp = tempfile::tempdir().unwrap();
    let tab = ext_root(tmp.path(), "Tools").join("T.tab");
    fs::create_dir_all(tab.join("Empty.panel/S.stack/Nothing.pushbutton")).unwrap();
    write(&tab.join("Full.panel/A.pushbutton/script.py"), "");

    let session = session(tmp.path());
    session.reload().await.unwrap();
    session
        .with_ui(|m| {
            assert!(!m.host().contains("Tools-T-Empty-panel"));
            assert_eq!(m.host().children(Some("Tools-T-tab")), vec!["Tools-T-Full-panel"]);
        })
        .await;
}

#[tokio::test]
async fn colliding_commands_get_distinct_elements() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("cmdA.pushbutton/script.py"), "");
    write(&panel.join("cmd A.pushbutton/script.py"), "");

    let session = session(tmp.path());
    session.reload().await.unwrap();
    assert_eq!(buttons(&session).await, vec![
        "Tools-T-P-cmdA-pushbutton",
        "Tools-T-P-cmdA-pushbutton#2"
    ]);
}

#[tokio::test]
async fn grouped_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("Pick.pulldown/Pick_OptionA.pushbutton/script.py"), "");
    write(&panel.join("Pick.pulldown/Pick_OptionB.pushbutton/script.py"), "");
    write(&panel.join("OptionA.pushbutton/script.py"), "");

    let session = session(tmp.path());
    session.reload().await.unwrap();
    let ext = session.extension("Tools").await.unwrap();
    let group = ext
        .find("Tools-T-P-Pick-pulldown")
        .expect("group component");
    let names: Vec<_> = group.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["OptionA", "OptionB"]);

    session
        .with_ui(|m| {
            let ui = m.host();
            let items = ui.children(Some("Tools-T-P-panel"));
            assert_eq!(items.len(), 2);
            let group = ui.get("Tools-T-P-Pick-pulldown").unwrap();
            assert!(matches!(group.element.kind, ElementKind::Group(_)));
            assert_eq!(ui.children(Some("Tools-T-P-Pick-pulldown")).len(), 2);
            assert_eq!(ui.buttons().len(), 3);
        })
        .await;
}

#[tokio::test]
async fn reload_converges_to_new_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("Old.pushbutton/script.py"), "");
    write(&panel.join("Stay.pushbutton/script.py"), "");

    let session = session(tmp.path());
    session.reload().await.unwrap();

    fs::remove_dir_all(panel.join("Old.pushbutton")).unwrap();
    write(&panel.join("New.pushbutton/script.py"), "__context__ = 'Walls'\n");
    let summary = session.reload().await.unwrap();
    assert_eq!(summary.removed_elements, vec!["Tools-T-P-Old-pushbutton"]);
    assert_eq!(buttons(&session).await, vec![
        "Tools-T-P-New-pushbutton",
        "Tools-T-P-Stay-pushbutton"
    ]);

    assert!(!enabled(&session, "Tools-T-P-New-pushbutton").await);
    session
        .set_host_state(HostState {
            has_active_document: true,
            selection_categories: vec!["Walls".into()],
        })
        .await;
    assert!(enabled(&session, "Tools-T-P-New-pushbutton").await);
    assert!(session.is_available("Tools-T-P-New-pushbutton").await);
}

#[tokio::test]
async fn disabling_an_extension_removes_its_ui() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        &ext_root(tmp.path(), "Keep").join("K.tab/P.panel/A.pushbutton/script.py"),
        "",
    );
    write(
        &ext_root(tmp.path(), "Drop").join("D.tab/P.panel/A.pushbutton/script.py"),
        "",
    );
    let first = session(tmp.path());
    first.reload().await.unwrap();
    assert_eq!(buttons(&first).await.len(), 2);

    // Same UI host, new configuration.
    let mut config = config(tmp.path());
    config.extensions.disabled = vec!["drop".into()];
    let discoverer = Arc::new(FsExtensionDiscoverer::from_config(&config));
    let session = first.with_discoverer(discoverer);
    let summary = session.reload().await.unwrap();

    assert!(matches!(
        summary.report("Drop").unwrap().status,
        ExtensionStatus::Disabled
    ));
    assert_eq!(buttons(&session).await, vec!["Keep-K-P-A-pushbutton"]);
    assert!(session.modules().get("Drop").await.is_none());
    assert!(summary.removed_elements.contains(&"Drop-D-tab".to_string()));
}

/// Reports a root that cannot be hashed next to a real one.
struct BrokenFirst {
    inner: FsExtensionDiscoverer,
    missing: PathBuf,
}

#[async_trait]
impl ExtensionDiscoverer for BrokenFirst {
    async fn discover(&self) -> anyhow::Result<Vec<ExtensionInfo>> {
        let mut found = vec![ExtensionInfo {
            name: "Ghost".into(),
            kind: ExtensionKind::Ui,
            directory: self.missing.clone(),
            enabled: true,
            dir_hash: String::new(),
        }];
        found.extend(self.inner.discover().await?);
        Ok(found)
    }
}

#[tokio::test]
async fn failing_extension_does_not_affect_siblings() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        &ext_root(tmp.path(), "Good").join("T.tab/P.panel/A.pushbutton/script.py"),
        "",
    );
    let config = config(tmp.path());
    let discoverer = Arc::new(BrokenFirst {
        inner: FsExtensionDiscoverer::from_config(&config),
        missing: tmp.path().join("gone/Ghost.extension"),
    });
    let session = session_with(tmp.path(), config).with_discoverer(discoverer);
    let summary = session.reload().await.unwrap();

    assert!(matches!(
        summary.report("Ghost").unwrap().status,
        ExtensionStatus::Failed {
            stage: Stage::Hash,
            ..
        }
    ));
    assert!(summary.is_loaded("Good"));
    assert_eq!(buttons(&session).await, vec!["Good-T-P-A-pushbutton"]);
}

#[tokio::test]
async fn failed_commands_are_absent_but_siblings_remain() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("Ok.pushbutton/script.py"), "");
    write(&panel.join("Compiled.pushbutton/script.cs"), "");
    write(&panel.join("Orphan.pushbutton/icon.png"), "png");

    let session = session(tmp.path());
    let summary = session.reload().await.unwrap();
    let report = summary.loaded_report("Tools").unwrap();
    assert_eq!(report.dropped, vec!["Tools-T-P-Compiled-pushbutton"]);
    assert_eq!(report.commands, 1);
    assert!(report.parse_diagnostics >= 1);
    assert_eq!(buttons(&session).await, vec!["Tools-T-P-Ok-pushbutton"]);
}

#[tokio::test]
async fn library_paths_reach_command_scripts() {
    let tmp = tempfile::tempdir().unwrap();
    let lib = tmp.path().join("exts/Shared.lib");
    write(&lib.join("helpers.py"), "");
    let cmd = ext_root(tmp.path(), "Tools").join("T.tab/P.panel/A.pushbutton");
    write(&cmd.join("script.py"), "");

    let session = session(tmp.path());
    let summary = session.reload().await.unwrap();
    assert_eq!(summary.libraries, vec!["Shared"]);

    let out = session
        .invoke("Tools-T-P-A-pushbutton", Vec::new())
        .await
        .unwrap();
    let paths: Vec<PathBuf> = std::env::split_paths(out.stdout.trim()).collect();
    assert_eq!(paths.first(), Some(&cmd));
    assert!(paths.contains(&lib));
}

#[tokio::test]
async fn startup_script_failure_is_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let root = ext_root(tmp.path(), "Tools");
    write(&root.join("startup.rb"), "");
    write(&root.join("T.tab/P.panel/A.pushbutton/script.py"), "");

    let mut config = config(tmp.path());
    config.engines.insert("ruby".into(), EngineConfig {
        command: "sh".into(),
        args: vec!["-c".into(), "exit 1".into()],
    });
    let session = session_with(tmp.path(), config);
    let summary = session.reload().await.unwrap();
    assert!(summary.is_loaded("Tools"));
    assert_eq!(buttons(&session).await.len(), 1);
}

#[tokio::test]
async fn moved_extension_runs_from_its_new_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let old = ext_root(tmp.path(), "Tools");
    write(&old.join("T.tab/P.panel/A.pushbutton/script.py"), "");

    let mut config = config(tmp.path());
    config.extensions.search_paths.push(tmp.path().join("moved"));
    session_with(tmp.path(), config.clone()).reload().await.unwrap();

    let new = tmp.path().join("moved/Tools.extension");
    fs::create_dir_all(new.parent().unwrap()).unwrap();
    fs::rename(&old, &new).unwrap();

    let fresh = session_with(tmp.path(), config);
    let summary = fresh.reload().await.unwrap();
    let report = summary.loaded_report("Tools").unwrap();
    assert!(report.from_cache);
    assert_eq!(buttons(&fresh).await, vec!["Tools-T-P-A-pushbutton"]);

    let ext = fresh.extension("Tools").await.unwrap();
    let cmd = new.join("T.tab/P.panel/A.pushbutton");
    assert_eq!(ext.commands()[0].command.as_ref().unwrap().script_path, cmd.join("script.py"));

    let out = fresh.invoke("Tools-T-P-A-pushbutton", Vec::new()).await.unwrap();
    let paths: Vec<PathBuf> = std::env::split_paths(out.stdout.trim()).collect();
    assert_eq!(paths.first(), Some(&cmd));
}

#[tokio::test]
async fn new_library_reaches_stored_bindings() {
    let tmp = tempfile::tempdir().unwrap();
    let cmd = ext_root(tmp.path(), "Tools").join("T.tab/P.panel/A.pushbutton");
    write(&cmd.join("script.py"), "");
    session(tmp.path()).reload().await.unwrap();

    let lib = tmp.path().join("exts/Shared.lib");
    write(&lib.join("helpers.py"), "");
    let fresh = session(tmp.path());
    let summary = fresh.reload().await.unwrap();
    assert_eq!(summary.libraries, vec!["Shared"]);
    assert_eq!(summary.loaded_report("Tools").unwrap().origin, ModuleOrigin::Generated);

    let out = fresh.invoke("Tools-T-P-A-pushbutton", Vec::new()).await.unwrap();
    let paths: Vec<PathBuf> = std::env::split_paths(out.stdout.trim()).collect();
    assert!(paths.contains(&lib));
}

#[tokio::test]
async fn layout_reorder_moves_existing_buttons() {
    let tmp = tempfile::tempdir().unwrap();
    let panel = ext_root(tmp.path(), "Tools").join("T.tab/P.panel");
    write(&panel.join("A.pushbutton/script.py"), "");
    write(&panel.join("B.pushbutton/script.py"), "");

    let session = session(tmp.path());
    session.reload().await.unwrap();
    assert_eq!(panel_children(&session, "Tools-T-P-panel").await, vec![
        "Tools-T-P-A-pushbutton",
        "Tools-T-P-B-pushbutton"
    ]);

    write(&panel.join("_layout"), "B\nA\n");
    let summary = session.reload().await.unwrap();
    assert_eq!(summary.loaded_report("Tools").unwrap().ui.created, 0);
    assert_eq!(panel_children(&session, "Tools-T-P-panel").await, vec![
        "Tools-T-P-B-pushbutton",
        "Tools-T-P-A-pushbutton"
    ]);
}

#[tokio::test]
async fn corrupt_tree_artifact_is_reparsed() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        &ext_root(tmp.path(), "Tools").join("T.tab/P.panel/A.pushbutton/script.py"),
        "",
    );
    session(tmp.path()).reload().await.unwrap();

    let mut corrupted = 0;
    for entry in fs::read_dir(tmp.path().join("cache")).unwrap() {
        let path = entry.unwrap().path();
        if path.to_string_lossy().ends_with(".tree.json") {
            fs::write(&path, "{not json").unwrap();
            corrupted += 1;
        }
    }
    assert_eq!(corrupted, 1);

    let fresh = session(tmp.path());
    let summary = fresh.reload().await.unwrap();
    let report = summary.loaded_report("Tools").unwrap();
    assert!(!report.from_cache);
    assert_eq!(buttons(&fresh).await, vec!["Tools-T-P-A-pushbutton"]);
}
