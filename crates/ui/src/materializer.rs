//! UI Materializer: reconciles host UI elements with component trees.
//!
//! Every element placed during a pass is marked touched; [`Materializer::cleanup`]
//! removes whatever the pass did not touch. Stacks are layout only: their
//! items are placed in the enclosing panel with `stack` set.

use std::collections::{HashMap, HashSet};

use {
    ribbon_bindings::{BindingModule, HostState},
    ribbon_extensions::{CommandKind, Component, ComponentKind, Extension},
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::host::{ElementKind, HostUi, UiElement};

/// Host facts that decide which commands get an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub host_version: u32,
    pub locale: String,
    pub load_beta: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            host_version: u32::MAX,
            locale: ribbon_extensions::types::FALLBACK_LOCALE.into(),
            load_beta: false,
        }
    }
}

impl MaterializeOptions {
    pub fn from_config(config: &ribbon_config::RibbonConfig) -> Self {
        Self {
            host_version: config.host.version,
            locale: config.host.locale.clone(),
            load_beta: config.extensions.load_beta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementFailure {
    pub unique_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<ElementFailure>,
}

struct Placed {
    extension: String,
    kind: ElementKind,
    depth: usize,
}

pub struct Materializer<H: HostUi> {
    host: H,
    options: MaterializeOptions,
    placed: HashMap<String, Placed>,
    touched: HashSet<String>,
    /// Last element placed under each parent during the current pass.
    last_child: HashMap<Option<String>, String>,
}

impl<H: HostUi> Materializer<H> {
    pub fn new(host: H, options: MaterializeOptions) -> Self {
        Self {
            host,
            options,
            placed: HashMap::new(),
            touched: HashSet::new(),
            last_child: HashMap::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn options(&self) -> &MaterializeOptions {
        &self.options
    }

    /// Unique ids of every live element, sorted.
    pub fn element_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.placed.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.placed.contains_key(unique_id)
    }

    /// Start a reload pass: nothing is touched yet.
    pub fn begin_pass(&mut self) {
        self.touched.clear();
        self.last_child.clear();
    }

    /// Create or update the elements for `extension`.
    pub fn materialize(
        &mut self,
        extension: &Extension,
        module: &BindingModule,
        state: &HostState,
    ) -> MaterializeReport {
        let mut pass = Pass {
            extension: &extension.name,
            module,
            state,
            report: MaterializeReport::default(),
        };
        for tab in extension.tabs() {
            if !self.shows(tab, module) {
                continue;
            }
            let element = self.element(&pass, tab, ElementKind::Tab, None, None);
            if !self.place(&mut pass, element, 0, |host, e| host.ensure_tab(e)) {
                continue;
            }
            for panel in &tab.children {
                if !self.shows(panel, module) {
                    continue;
                }
                let element =
                    self.element(&pass, panel, ElementKind::Panel, Some(&tab.unique_id), None);
                if self.place(&mut pass, element, 1, |host, e| host.ensure_panel(e)) {
                    self.place_items(&mut pass, &panel.children, &panel.unique_id, None, 2);
                }
            }
        }
        debug!(
            extension = %extension.name,
            created = pass.report.created,
            updated = pass.report.updated,
            failed = pass.report.failures.len(),
            "materialized"
        );
        pass.report
    }

    fn place_items(
        &mut self,
        pass: &mut Pass<'_>,
        items: &[Component],
        parent: &str,
        stack: Option<&str>,
        depth: usize,
    ) {
        for item in items {
            if !self.shows(item, pass.module) {
                continue;
            }
            self.place_markers(pass, item, parent, depth);
            match item.kind {
                ComponentKind::Stack => {
                    self.place_items(pass, &item.children, parent, Some(&item.unique_id), depth);
                },
                ComponentKind::Group(kind) => {
                    let element =
                        self.element(pass, item, ElementKind::Group(kind), Some(parent), stack);
                    if self.place(pass, element, depth, |host, e| host.ensure_group(e)) {
                        self.place_items(pass, &item.children, &item.unique_id, None, depth + 1);
                    }
                },
                ComponentKind::Command(kind) => self.place_button(pass, item, kind, parent, stack, depth),
                ComponentKind::Extension | ComponentKind::Tab | ComponentKind::Panel => {
                    debug!(component = %item.unique_id, "unexpected container inside a panel");
                },
            }
        }
    }

    fn place_markers(&mut self, pass: &mut Pass<'_>, item: &Component, parent: &str, depth: usize) {
        let markers = [
            (item.layout.separator_before, ElementKind::Separator, "separator"),
            (item.layout.slideout_before, ElementKind::Slideout, "slideout"),
        ];
        for (wanted, kind, tag) in markers {
            if !wanted {
                continue;
            }
            let element = UiElement {
                unique_id: format!("{}-{tag}", item.unique_id),
                kind,
                parent: Some(parent.to_string()),
                stack: None,
                after: None,
                extension: pass.extension.to_string(),
                title: String::new(),
                tooltip: None,
                icons: Default::default(),
                help_url: None,
            };
            self.place(pass, element, depth, |host, e| host.ensure_marker(e));
        }
    }

    fn place_button(
        &mut self,
        pass: &mut Pass<'_>,
        item: &Component,
        kind: CommandKind,
        parent: &str,
        stack: Option<&str>,
        depth: usize,
    ) {
        let Some(handler) = pass.module.handler(&item.unique_id) else {
            return;
        };
        let element = self.element(pass, item, ElementKind::Button(kind), Some(parent), stack);
        let id = element.unique_id.clone();
        if !self.place(pass, element, depth, |host, e| host.ensure_button(e, handler)) {
            return;
        }
        let enabled = pass.module.is_available(&id, pass.state);
        if let Err(e) = self.host.set_enabled(&id, enabled) {
            warn!(element = %id, error = %e, "failed to set enabled state");
        }
    }

    /// Run one host call and record the element. Returns whether it exists now.
    fn place(
        &mut self,
        pass: &mut Pass<'_>,
        mut element: UiElement,
        depth: usize,
        call: impl FnOnce(&mut H, &UiElement) -> anyhow::Result<()>,
    ) -> bool {
        element.after = self
            .last_child
            .get(&element.parent)
            .filter(|prev| **prev != element.unique_id)
            .cloned();
        match call(&mut self.host, &element) {
            Ok(()) => {
                self.last_child
                    .insert(element.parent.clone(), element.unique_id.clone());
                let existed = self
                    .placed
                    .insert(element.unique_id.clone(), Placed {
                        extension: element.extension.clone(),
                        kind: element.kind,
                        depth,
                    })
                    .is_some();
                if existed {
                    pass.report.updated += 1;
                } else {
                    pass.report.created += 1;
                }
                self.touched.insert(element.unique_id);
                true
            },
            Err(e) => {
                warn!(
                    extension = %pass.extension,
                    element = %element.unique_id,
                    error = %e,
                    "failed to materialize element, skipping"
                );
                pass.report.failures.push(ElementFailure {
                    unique_id: element.unique_id,
                    reason: e.to_string(),
                });
                false
            },
        }
    }

    fn element(
        &self,
        pass: &Pass<'_>,
        component: &Component,
        kind: ElementKind,
        parent: Option<&str>,
        stack: Option<&str>,
    ) -> UiElement {
        let locale = &self.options.locale;
        let meta = component.command.as_ref().map(|c| &c.metadata);
        UiElement {
            unique_id: component.unique_id.clone(),
            kind,
            parent: parent.map(str::to_string),
            stack: stack.map(str::to_string),
            after: None,
            extension: pass.extension.to_string(),
            title: component.display_title(locale),
            tooltip: meta
                .and_then(|m| m.tooltip.as_ref())
                .and_then(|t| t.resolve(locale))
                .map(str::to_string),
            icons: component.icons.clone(),
            help_url: meta.and_then(|m| m.help_url.clone()),
        }
    }

    /// Whether a component gets an element in this host.
    fn shows(&self, component: &Component, module: &BindingModule) -> bool {
        match component.kind {
            ComponentKind::Command(CommandKind::NoGui) => false,
            ComponentKind::Command(_) => {
                let Some(meta) = component.command.as_ref().map(|c| &c.metadata) else {
                    return false;
                };
                module.contains(&component.unique_id)
                    && meta.supports_host(self.options.host_version)
                    && (self.options.load_beta || !meta.beta)
            },
            _ => component.children.iter().any(|c| self.shows(c, module)),
        }
    }

    /// Re-evaluate the enabled state of every button of `module`.
    pub fn apply_availability(&mut self, module: &BindingModule, state: &HostState) {
        let buttons: Vec<String> = self
            .placed
            .iter()
            .filter(|(_, p)| p.extension == module.extension() && matches!(p.kind, ElementKind::Button(_)))
            .map(|(id, _)| id.clone())
            .collect();
        for id in buttons {
            if let Err(e) = self.host.set_enabled(&id, module.is_available(&id, state)) {
                warn!(element = %id, error = %e, "failed to set enabled state");
            }
        }
    }

    /// Show or hide the top-level elements of one extension.
    pub fn set_extension_visible(&mut self, extension: &str, visible: bool) {
        let tabs: Vec<String> = self
            .placed
            .iter()
            .filter(|(_, p)| p.extension == extension && p.kind == ElementKind::Tab)
            .map(|(id, _)| id.clone())
            .collect();
        for id in tabs {
            if let Err(e) = self.host.set_visible(&id, visible) {
                warn!(element = %id, error = %e, "failed to change visibility");
            }
        }
    }

    /// Remove every element not touched since [`Materializer::begin_pass`],
    /// and everything owned by `stale_extensions`.
    ///
    /// Children go before their parents. Returns the removed ids.
    pub fn cleanup(&mut self, stale_extensions: &[String]) -> Vec<String> {
        let mut doomed: Vec<(usize, String)> = self
            .placed
            .iter()
            .filter(|(id, p)| !self.touched.contains(*id) || stale_extensions.contains(&p.extension))
            .map(|(id, p)| (p.depth, id.clone()))
            .collect();
        doomed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut removed = Vec::with_capacity(doomed.len());
        for (_, id) in doomed {
            match self.host.remove(&id) {
                Ok(()) => {
                    self.placed.remove(&id);
                    self.touched.remove(&id);
                    removed.push(id);
                },
                Err(e) => warn!(element = %id, error = %e, "failed to remove stale element"),
            }
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "removed stale elements");
        }
        removed
    }
}

struct Pass<'a> {
    extension: &'a str,
    module: &'a BindingModule,
    state: &'a HostState,
    report: MaterializeReport,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::headless::HeadlessUi,
        ribbon_bindings::BindingGenerator,
        ribbon_config::{EngineConfig, RibbonConfig},
        std::{fs, path::Path, sync::Arc},
    };

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    async fn load(root: &Path) -> (Extension, Arc<BindingModule>) {
        let mut config = RibbonConfig::default();
        config.engines.insert("python".into(), EngineConfig {
            command: "true".into(),
            args: Vec::new(),
        });
        let mut ext = ribbon_extensions::parse(root).unwrap();
        ext.dir_hash = "h".into();
        let out = BindingGenerator::new(&config)
            .with_artifact_dir(None)
            .with_log_dir(None)
            .generate(&ext, None)
            .await
            .unwrap();
        (ext, out.module)
    }

    fn materializer() -> Materializer<HeadlessUi> {
        Materializer::new(HeadlessUi::new(), MaterializeOptions {
            host_version: 2024,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn stacks_are_transparent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Ext.extension");
        let panel = root.join("T.tab/P.panel");
        write(&panel.join("S.stack/A.pushbutton/script.py"), "");
        write(&panel.join("S.stack/G.pulldown/G_B.pushbutton/script.py"), "");
        let (ext, module) = load(&root).await;

        let mut m = materializer();
        m.begin_pass();
        let report = m.materialize(&ext, &module, &HostState::default());
        assert!(report.failures.is_empty());

        let ui = m.host();
        let panel_id = "Ext-T-P-panel";
        let items = ui.children(Some(panel_id));
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|id| !id.ends_with("stack")));
        let a = ui.get(items[0]).unwrap();
        assert_eq!(a.element.stack.as_deref(), Some("Ext-T-P-S-stack"));
        assert_eq!(ui.children(Some(items[1])).len(), 1);
        assert_eq!(ui.get(ui.children(Some(items[1]))[0]).unwrap().element.title, "B");
    }

    #[tokio::test]
    async fn version_beta_and_nogui_filtering() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Ext.extension");
        let panel = root.join("T.tab/P.panel");
        write(&panel.join("Old.pushbutton/script.py"), "__max_revit_ver__ = 2020\n");
        write(&panel.join("Beta.pushbutton/script.py"), "__beta__ = True\n");
        write(&panel.join("Hidden.nobutton/script.py"), "");
        write(&root.join("T2.tab/Q.panel/Ok.pushbutton/script.py"), "");
        let (ext, module) = load(&root).await;
        assert_eq!(module.len(), 4);

        let mut m = materializer();
        m.begin_pass();
        m.materialize(&ext, &module, &HostState::default());
        assert_eq!(m.host().buttons(), vec!["Ext-T2-Q-Ok-pushbutton"]);
        assert!(!m.contains("Ext-T-tab"));
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Ext.extension");
        let panel = root.join("T.tab/P.panel");
        write(&panel.join("A.pushbutton/script.py"), "");
        write(&panel.join("B.pushbutton/script.py"), "");
        let (ext, module) = load(&root).await;

        let mut ui = HeadlessUi::new();
        ui.fail_on("Ext-T-P-A-pushbutton");
        let mut m = Materializer::new(ui, MaterializeOptions::default());
        m.begin_pass();
        let report = m.materialize(&ext, &module, &HostState::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(m.host().buttons(), vec!["Ext-T-P-B-pushbutton"]);
    }

    #[tokio::test]
    async fn reload_converges_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Ext.extension");
        let panel = root.join("T.tab/P.panel");
        write(&panel.join("Keep.pushbutton/script.py"), "");
        write(&panel.join("Gone.pushbutton/script.py"), "");
        let (ext, module) = load(&root).await;

        let mut m = materializer();
        m.begin_pass();
        let first = m.materialize(&ext, &module, &HostState::default());
        assert_eq!(first.created, 4);
        assert!(m.cleanup(&[]).is_empty());

        fs::remove_dir_all(panel.join("Gone.pushbutton")).unwrap();
        write(&panel.join("New.pushbutton/script.py"), "__context__ = 'active-doc'\n");
        let (ext, module) = load(&root).await;
        m.begin_pass();
        let second = m.materialize(&ext, &module, &HostState::default());
        assert_eq!(second.created, 1);
        assert_eq!(second.updated, 3);
        assert_eq!(m.cleanup(&[]), vec!["Ext-T-P-Gone-pushbutton"]);

        assert_eq!(m.host().buttons(), vec![
            "Ext-T-P-Keep-pushbutton",
            "Ext-T-P-New-pushbutton"
        ]);
        assert!(!m.host().get("Ext-T-P-New-pushbutton").unwrap().enabled);
        m.apply_availability(&module, &HostState {
            has_active_document: true,
            selection_categories: Vec::new(),
        });
        assert!(m.host().get("Ext-T-P-New-pushbutton").unwrap().enabled);

        m.set_extension_visible("Ext", false);
        assert!(!m.host().get("Ext-T-tab").unwrap().visible);

        m.begin_pass();
        let removed = m.cleanup(&["Ext".to_string()]);
        assert_eq!(removed.last().map(String::as_str), Some("Ext-T-tab"));
        assert!(m.host().is_empty());
    }
}
