//! In-memory host used by the CLI and by tests.

use std::{
    collections::{HashMap, HashSet},
    fmt::Write as _,
    sync::Arc,
};

use {
    anyhow::{Result, anyhow, bail},
    ribbon_bindings::CommandHandler,
};

use crate::host::{ElementKind, HostUi, UiElement};

pub struct HeadlessElement {
    pub element: UiElement,
    pub enabled: bool,
    pub visible: bool,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

/// Element tree kept in memory. Children are ordered by each element's
/// `after` link at its last upsert.
#[derive(Default)]
pub struct HeadlessUi {
    elements: HashMap<String, HeadlessElement>,
    children: HashMap<Option<String>, Vec<String>>,
    failing: HashSet<String>,
    created: usize,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `ensure_*` call for `unique_id` fail.
    pub fn fail_on(&mut self, unique_id: impl Into<String>) {
        self.failing.insert(unique_id.into());
    }

    pub fn get(&self, unique_id: &str) -> Option<&HeadlessElement> {
        self.elements.get(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.elements.contains_key(unique_id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// How many elements were ever created (updates excluded).
    pub fn created(&self) -> usize {
        self.created
    }

    /// Child ids of `parent` (`None` for tabs) in display order.
    pub fn children(&self, parent: Option<&str>) -> Vec<&str> {
        self.children
            .get(&parent.map(str::to_string))
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Ids of every button, sorted.
    pub fn buttons(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .elements
            .values()
            .filter(|e| matches!(e.element.kind, ElementKind::Button(_)))
            .map(|e| e.element.unique_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Indented text rendering of the element tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_level(None, 0, &mut out);
        out
    }

    fn render_level(&self, parent: Option<&str>, depth: usize, out: &mut String) {
        for id in self.children(parent) {
            let Some(entry) = self.elements.get(id) else {
                continue;
            };
            let label = match entry.element.kind {
                ElementKind::Tab => format!("[tab] {}", entry.element.title),
                ElementKind::Panel => format!("[panel] {}", entry.element.title),
                ElementKind::Group(_) => format!("[group] {}", entry.element.title),
                ElementKind::Button(kind) => format!("{} ({kind:?})", entry.element.title),
                ElementKind::Separator => "----".to_string(),
                ElementKind::Slideout => ">>>>".to_string(),
            };
            let flags = match (entry.enabled, entry.visible) {
                (true, true) => "",
                (false, true) => " [disabled]",
                (_, false) => " [hidden]",
            };
            let stacked = if entry.element.stack.is_some() { " [stacked]" } else { "" };
            let _ = writeln!(out, "{}{label}{stacked}{flags}", "  ".repeat(depth));
            self.render_level(Some(id), depth + 1, out);
        }
    }

    fn upsert(&mut self, element: &UiElement, handler: Option<Arc<dyn CommandHandler>>) -> Result<()> {
        if self.failing.contains(&element.unique_id) {
            bail!("host refused element '{}'", element.unique_id);
        }
        if let Some(parent) = &element.parent
            && !self.elements.contains_key(parent)
        {
            bail!(
                "parent '{parent}' of '{}' does not exist",
                element.unique_id
            );
        }
        let moved_from = match self.elements.get_mut(&element.unique_id) {
            Some(existing) => {
                let previous = existing.element.parent.clone();
                existing.element = element.clone();
                if handler.is_some() {
                    existing.handler = handler;
                }
                Some(previous)
            },
            None => {
                self.elements.insert(element.unique_id.clone(), HeadlessElement {
                    element: element.clone(),
                    enabled: true,
                    visible: true,
                    handler,
                });
                self.created += 1;
                None
            },
        };
        if let Some(previous) = moved_from
            && let Some(siblings) = self.children.get_mut(&previous)
        {
            siblings.retain(|id| *id != element.unique_id);
        }
        let siblings = self.children.entry(element.parent.clone()).or_default();
        let at = match &element.after {
            None => 0,
            Some(after) => siblings
                .iter()
                .position(|id| id == after)
                .map_or(siblings.len(), |i| i + 1),
        };
        siblings.insert(at, element.unique_id.clone());
        Ok(())
    }

    fn entry_mut(&mut self, unique_id: &str) -> Result<&mut HeadlessElement> {
        self.elements
            .get_mut(unique_id)
            .ok_or_else(|| anyhow!("no element '{unique_id}'"))
    }
}

impl HostUi for HeadlessUi {
    fn ensure_tab(&mut self, element: &UiElement) -> Result<()> {
        self.upsert(element, None)
    }

    fn ensure_panel(&mut self, element: &UiElement) -> Result<()> {
        self.upsert(element, None)
    }

    fn ensure_group(&mut self, element: &UiElement) -> Result<()> {
        self.upsert(element, None)
    }

    fn ensure_button(
        &mut self,
        element: &UiElement,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        self.upsert(element, Some(handler))
    }

    fn ensure_marker(&mut self, element: &UiElement) -> Result<()> {
        self.upsert(element, None)
    }

    /// Removes the element together with anything still beneath it.
    fn remove(&mut self, unique_id: &str) -> Result<()> {
        let entry = self
            .elements
            .remove(unique_id)
            .ok_or_else(|| anyhow!("no element '{unique_id}'"))?;
        if let Some(siblings) = self.children.get_mut(&entry.element.parent) {
            siblings.retain(|id| id != unique_id);
        }
        let orphans = self
            .children
            .remove(&Some(unique_id.to_string()))
            .unwrap_or_default();
        for child in orphans {
            self.remove(&child)?;
        }
        Ok(())
    }

    fn set_enabled(&mut self, unique_id: &str, enabled: bool) -> Result<()> {
        self.entry_mut(unique_id)?.enabled = enabled;
        Ok(())
    }

    fn set_visible(&mut self, unique_id: &str, visible: bool) -> Result<()> {
        self.entry_mut(unique_id)?.visible = visible;
        Ok(())
    }
}
