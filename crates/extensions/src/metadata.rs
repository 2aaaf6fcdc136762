//! Command and container metadata: `bundle.yaml` plus script literals.
//!
//! `bundle.yaml` values win over script literals field by field.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    literals::{ScriptLiterals, read_literals},
    types::{CommandMetadata, EngineFlags, LocalizedText, ScriptLanguage},
};

pub const BUNDLE_FILE: &str = "bundle.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn joined(&self, sep: &str) -> String {
        match self {
            Self::One(s) => s.clone(),
            Self::Many(items) => items.join(sep),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct BundleEngine {
    pub clean: Option<bool>,
    pub full_frame: Option<bool>,
    pub persistent: Option<bool>,
}

/// Parsed `bundle.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BundleFile {
    pub title: Option<LocalizedText>,
    #[serde(alias = "tooltips")]
    pub tooltip: Option<LocalizedText>,
    pub author: Option<String>,
    pub authors: Vec<String>,
    pub context: Option<OneOrMany>,
    #[serde(alias = "min_revit_version")]
    pub min_host_version: Option<serde_yaml::Value>,
    #[serde(alias = "max_revit_version")]
    pub max_host_version: Option<serde_yaml::Value>,
    pub help_url: Option<String>,
    pub beta: Option<bool>,
    pub options: Vec<String>,
    pub engine: Option<BundleEngine>,
    pub assembly: Option<String>,
    pub command_class: Option<String>,
    pub availability_class: Option<String>,
    pub hyperlink: Option<String>,
    /// Child ordering; same syntax as a `_layout` file.
    pub layout: Vec<String>,
}

/// Read `bundle.yaml` from `dir` if present.
pub fn read_bundle(dir: &Path) -> Result<Option<BundleFile>> {
    let path = dir.join(BUNDLE_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
    if raw.trim().is_empty() {
        return Ok(Some(BundleFile::default()));
    }
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::invalid_bundle(&path, e.to_string()))
}

fn yaml_u32(value: &serde_yaml::Value) -> Option<u32> {
    match value {
        serde_yaml::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_yaml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Metadata resolved for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub title: Option<LocalizedText>,
    pub availability: Option<String>,
    pub metadata: CommandMetadata,
}

/// Read literals from `script` when it is a Python file.
///
/// Unreadable files yield no literals; metadata is optional.
pub fn script_literals(script: &Path, language: ScriptLanguage) -> Option<ScriptLiterals> {
    if language != ScriptLanguage::Python {
        return None;
    }
    match std::fs::read_to_string(script) {
        Ok(source) => Some(read_literals(&source)),
        Err(e) => {
            tracing::debug!(path = %script.display(), error = %e, "script unreadable, no metadata");
            None
        },
    }
}

/// Merge script literals and bundle values into command metadata.
pub fn resolve(literals: Option<&ScriptLiterals>, bundle: Option<&BundleFile>) -> ResolvedMetadata {
    let mut out = ResolvedMetadata::default();

    if let Some(lits) = literals {
        apply_literals(lits, &mut out);
    }
    if let Some(bundle) = bundle {
        apply_bundle(bundle, &mut out);
    }
    out
}

fn apply_literals(lits: &ScriptLiterals, out: &mut ResolvedMetadata) {
    let meta = &mut out.metadata;

    out.title = lits.get("__title__").and_then(|v| {
        v.as_str()
            .map(LocalizedText::from)
            .or_else(|| v.as_string_map().map(LocalizedText::Localized))
    });

    meta.tooltip = lits
        .get("__doc__")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| lits.docstring.clone())
        .filter(|s| !s.is_empty())
        .map(LocalizedText::Plain);

    meta.author = lits
        .get("__authors__")
        .and_then(|v| v.as_string_list())
        .map(|a| a.join("\n"))
        .or_else(|| lits.get("__author__").and_then(|v| v.as_str()).map(str::to_string));

    out.availability = lits
        .get("__context__")
        .and_then(|v| v.as_string_list())
        .map(|c| c.join(";"));

    meta.min_host_version = lits.get("__min_revit_ver__").and_then(|v| v.as_u32());
    meta.max_host_version = lits.get("__max_revit_ver__").and_then(|v| v.as_u32());
    meta.help_url = str_literal(lits, "__helpurl__");
    meta.beta = lits
        .get("__beta__")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    meta.options = lits
        .get("__options__")
        .and_then(|v| v.as_string_list())
        .unwrap_or_default();
    meta.engine = EngineFlags {
        clean: bool_literal(lits, "__cleanengine__"),
        full_frame: bool_literal(lits, "__fullframeengine__"),
        persistent: bool_literal(lits, "__persistentengine__"),
    };
    meta.assembly = str_literal(lits, "__assembly__");
    meta.command_class = str_literal(lits, "__commandclass__");
}

fn str_literal(lits: &ScriptLiterals, name: &str) -> Option<String> {
    lits.get(name).and_then(|v| v.as_str()).map(str::to_string)
}

fn bool_literal(lits: &ScriptLiterals, name: &str) -> bool {
    lits.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn apply_bundle(bundle: &BundleFile, out: &mut ResolvedMetadata) {
    let meta = &mut out.metadata;

    if let Some(title) = &bundle.title {
        out.title = Some(title.clone());
    }
    if let Some(tooltip) = &bundle.tooltip {
        meta.tooltip = Some(tooltip.clone());
    }
    if !bundle.authors.is_empty() {
        meta.author = Some(bundle.authors.join("\n"));
    } else if let Some(author) = &bundle.author {
        meta.author = Some(author.clone());
    }
    if let Some(context) = &bundle.context {
        out.availability = Some(context.joined(";"));
    }
    if let Some(min) = bundle.min_host_version.as_ref().and_then(yaml_u32) {
        meta.min_host_version = Some(min);
    }
    if let Some(max) = bundle.max_host_version.as_ref().and_then(yaml_u32) {
        meta.max_host_version = Some(max);
    }
    if let Some(beta) = bundle.beta {
        meta.beta = beta;
    }
    if !bundle.options.is_empty() {
        meta.options = bundle.options.clone();
    }
    if let Some(engine) = bundle.engine {
        meta.engine.clean = engine.clean.unwrap_or(meta.engine.clean);
        meta.engine.full_frame = engine.full_frame.unwrap_or(meta.engine.full_frame);
        meta.engine.persistent = engine.persistent.unwrap_or(meta.engine.persistent);
    }
    for (slot, value) in [
        (&mut meta.help_url, &bundle.help_url),
        (&mut meta.assembly, &bundle.assembly),
        (&mut meta.command_class, &bundle.command_class),
        (&mut meta.availability_class, &bundle.availability_class),
        (&mut meta.hyperlink, &bundle.hyperlink),
    ] {
        if value.is_some() {
            slot.clone_from(value);
        }
    }

    if out.availability.as_deref().is_some_and(|c| c.trim().is_empty()) {
        out.availability = None;
    }
}

/// Replace `{{key}}` placeholders with manifest template values.
pub fn apply_templates(text: &str, templates: &BTreeMap<String, String>) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    templates.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Apply manifest templates to every text field of a command.
pub fn template_metadata(resolved: &mut ResolvedMetadata, templates: &BTreeMap<String, String>) {
    if templates.is_empty() {
        return;
    }
    let fill = |s: &str| apply_templates(s, templates);
    if let Some(title) = &mut resolved.title {
        title.map_text(fill);
    }
    let meta = &mut resolved.metadata;
    if let Some(tooltip) = &mut meta.tooltip {
        tooltip.map_text(fill);
    }
    for field in [&mut meta.author, &mut meta.help_url, &mut meta.hyperlink] {
        if let Some(value) = field {
            *value = fill(value);
        }
    }
}

/// Find a file in `dir` named `<stem>.<ext>` for any script extension.
pub fn find_named_script(dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case(stem))
                && ScriptLanguage::from_path(p).is_some_and(ScriptLanguage::is_executable)
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_feed_metadata() {
        let lits = read_literals(
            "\"\"\"Does a thing.\"\"\"\n__title__ = 'Do\\nThing'\n__context__ = ['selection']\n__authors__ = ['A', 'B']\n__max_revit_ver__ = '2024'\n",
        );
        let resolved = resolve(Some(&lits), None);
        assert_eq!(resolved.title, Some(LocalizedText::from("Do\nThing")));
        assert_eq!(resolved.availability.as_deref(), Some("selection"));
        assert_eq!(resolved.metadata.author.as_deref(), Some("A\nB"));
        assert_eq!(resolved.metadata.max_host_version, Some(2024));
        assert_eq!(
            resolved.metadata.tooltip,
            Some(LocalizedText::from("Does a thing."))
        );
    }

    #[test]
    fn bundle_overrides_literals() {
        let lits = read_literals("__title__ = 'Script'\n__beta__ = True\n");
        let bundle: BundleFile = serde_yaml::from_str(
            "title:\n  en_us: Bundle\n  de_de: Paket\nbeta: false\ncontext: [OST_Walls, OST_Doors]\nmin_revit_version: 2021\nengine:\n  clean: true\n",
        )
        .unwrap();
        let resolved = resolve(Some(&lits), Some(&bundle));
        assert_eq!(
            resolved.title.as_ref().unwrap().resolve("de_de"),
            Some("Paket")
        );
        assert!(!resolved.metadata.beta);
        assert!(resolved.metadata.engine.clean);
        assert_eq!(resolved.metadata.min_host_version, Some(2021));
        assert_eq!(resolved.availability.as_deref(), Some("OST_Walls;OST_Doors"));
    }

    #[test]
    fn templates_fill_text_fields() {
        let mut templates = BTreeMap::new();
        templates.insert("author".to_string(), "Studio".to_string());
        templates.insert("docs".to_string(), "https://docs.example".to_string());
        let mut resolved = ResolvedMetadata {
            title: Some(LocalizedText::from("By {{author}}")),
            ..Default::default()
        };
        resolved.metadata.help_url = Some("{{docs}}/cmd".into());
        template_metadata(&mut resolved, &templates);
        assert_eq!(resolved.title, Some(LocalizedText::from("By Studio")));
        assert_eq!(
            resolved.metadata.help_url.as_deref(),
            Some("https://docs.example/cmd")
        );
        assert_eq!(apply_templates("{{missing}}", &templates), "{{missing}}");
    }

    #[test]
    fn invalid_bundle_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(BUNDLE_FILE), "title: [unclosed\n").unwrap();
        assert!(read_bundle(tmp.path()).is_err());
        assert!(read_bundle(&tmp.path().join("nope")).unwrap().is_none());
    }
}
