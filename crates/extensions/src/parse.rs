//! Directory Parser: builds a component tree from an extension directory.
//!
//! Problems are attributed to the directory that caused them and recorded as
//! diagnostics; a bad component is skipped and its siblings still load.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    kinds::{CommandKind, ComponentKind, ExtensionKind, match_suffix},
    layout::{apply_layout, read_layout},
    metadata::{
        BUNDLE_FILE, BundleFile, find_named_script, read_bundle, resolve, script_literals,
        template_metadata,
    },
    types::{
        CommandSpec, Component, Extension, ExtensionInfo, ExtensionManifest, IconSet,
        LayoutHints, ScriptLanguage,
    },
};

pub const DEFAULT_ICON: &str = "icon.png";
pub const DARK_ICON: &str = "icon.dark.png";
pub const ON_ICON: &str = "on.png";
pub const OFF_ICON: &str = "off.png";
pub const SCRIPT_STEM: &str = "script";
pub const CONFIG_STEM: &str = "config";
pub const STARTUP_STEM: &str = "startup";
pub const MANIFEST_FILE: &str = "extension.json";
pub const LIB_DIR: &str = "lib";

const IMAGE_EXTENSIONS: &[&str] = &["png", "ico", "bmp", "jpg", "jpeg", "gif", "svg"];

/// Whether `path` looks like an icon image.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|i| e.eq_ignore_ascii_case(i)))
}

/// A skipped component and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ParseReport {
    pub extension: Extension,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parse the extension rooted at `root`.
pub fn parse(root: &Path) -> Result<Extension> {
    parse_with_report(root).map(|report| report.extension)
}

/// Parse the extension rooted at `root`, keeping per-directory diagnostics.
///
/// Fails only when `root` is not an extension directory at all.
pub fn parse_with_report(root: &Path) -> Result<ParseReport> {
    let info = ExtensionInfo::from_dir(root).ok_or_else(|| Error::not_an_extension(root))?;
    if !root.is_dir() {
        return Err(Error::not_an_extension(root));
    }

    let mut diagnostics = Vec::new();
    let manifest = read_manifest(root, &mut diagnostics);
    let mut builder = TreeBuilder {
        templates: &manifest.templates,
        ids: HashMap::new(),
        diagnostics,
    };

    let mut tree = match info.kind {
        ExtensionKind::Ui => builder.container(root, &info.name, ComponentKind::Extension, &[], &[], None),
        ExtensionKind::Library => {
            let unique_id = builder.assign_id(&[], &info.name, ComponentKind::Extension);
            bare_component(root, &info.name, ComponentKind::Extension, unique_id, None)
        },
    };
    for pruned in tree.prune() {
        debug!(extension = %info.name, component = %pruned, "pruned container without commands");
    }
    let diagnostics = builder.diagnostics;

    let extension = Extension {
        name: info.name,
        kind: info.kind,
        directory: root.to_path_buf(),
        dir_hash: String::new(),
        library_paths: Vec::new(),
        enabled: true,
        startup_script: find_named_script(root, STARTUP_STEM),
        manifest,
        root: tree,
    };
    debug!(
        extension = %extension.name,
        commands = extension.commands().len(),
        diagnostics = diagnostics.len(),
        "parsed extension"
    );
    Ok(ParseReport {
        extension,
        diagnostics,
    })
}

/// Re-resolve icons for every component from the current directory state.
///
/// Icons are not part of the content hash, so a tree loaded from cache may
/// carry stale icon paths.
pub fn refresh_icons(extension: &mut Extension) {
    extension.root.visit_mut(&mut |c| {
        if c.kind != ComponentKind::Extension {
            c.icons = resolve_icons(&c.directory, &c.name, c.kind);
        }
    });
}

/// Find the icons for a component living in `dir`.
pub fn resolve_icons(dir: &Path, name: &str, kind: ComponentKind) -> IconSet {
    let images: Vec<PathBuf> = list_files(dir)
        .into_iter()
        .filter(|p| is_image(p))
        .collect();
    let named = |wanted: &str| {
        images
            .iter()
            .find(|p| {
                p.file_name()
                    .and_then(|f| f.to_str())
                    .is_some_and(|f| f.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    };

    let reserved = [DEFAULT_ICON, DARK_ICON, ON_ICON, OFF_ICON];
    let lowered = name.to_ascii_lowercase();
    let icon = named(DEFAULT_ICON).or_else(|| {
        images
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|f| f.to_str())
                    .is_some_and(|f| !reserved.iter().any(|r| f.eq_ignore_ascii_case(r)))
            })
            .find(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| stem_names(&s.to_ascii_lowercase(), &lowered))
            })
            .cloned()
    });

    let toggle = kind == ComponentKind::Command(CommandKind::Toggle);
    IconSet {
        icon,
        dark: named(DARK_ICON),
        on: if toggle { named(ON_ICON) } else { None },
        off: if toggle { named(OFF_ICON) } else { None },
    }
}

/// `stem` is `name` itself or ends in `name` right after a `_`, `.`, `-` or
/// space, as in `Pick_OptionA` for a command named `OptionA`.
fn stem_names(stem: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    match stem.strip_suffix(name) {
        Some("") => true,
        Some(prefix) => prefix.ends_with(['_', '.', '-', ' ']),
        None => false,
    }
}

fn read_manifest(root: &Path, diagnostics: &mut Vec<ParseDiagnostic>) -> ExtensionManifest {
    let path = root.join(MANIFEST_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ExtensionManifest::default(),
        Err(e) => {
            diagnostics.push(ParseDiagnostic {
                path,
                message: format!("unreadable manifest: {e}"),
            });
            return ExtensionManifest::default();
        },
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid extension manifest");
        diagnostics.push(ParseDiagnostic {
            path,
            message: format!("invalid manifest: {e}"),
        });
        ExtensionManifest::default()
    })
}

/// Entries of `dir` sorted by file name, split by a predicate.
fn list_sorted(dir: &Path, want_dirs: bool) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() == want_dirs)
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    paths
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    list_sorted(dir, false)
}

fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    list_sorted(dir, true)
}

/// Keep `[A-Za-z0-9_-]` only.
pub fn clean_id_part(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// `Pick_OptionA` inside group `Pick` displays as `OptionA`.
fn strip_group_prefix<'a>(child: &'a str, group: &str) -> &'a str {
    child
        .strip_prefix(group)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(child)
}

/// `dir/lib` (if present) followed by the inherited roots.
fn with_lib(dir: &Path, inherited: &[PathBuf]) -> Vec<PathBuf> {
    let lib = dir.join(LIB_DIR);
    let mut paths = Vec::with_capacity(inherited.len() + 1);
    if lib.is_dir() {
        paths.push(lib);
    }
    paths.extend(inherited.iter().cloned());
    paths
}

fn bare_component(
    dir: &Path,
    name: &str,
    kind: ComponentKind,
    unique_id: String,
    parent_id: Option<&str>,
) -> Component {
    Component {
        name: name.to_string(),
        kind,
        directory: dir.to_path_buf(),
        unique_id,
        parent_id: parent_id.map(str::to_string),
        title: None,
        icons: IconSet::default(),
        layout: LayoutHints::default(),
        children: Vec::new(),
        command: None,
    }
}

/// Pick the script a command runs.
///
/// `script.<ext>` wins; otherwise a lone script file; content commands use
/// their content file; link, invoke and url commands may stand on their
/// `bundle.yaml` alone.
fn find_script(dir: &Path, kind: CommandKind) -> Option<(PathBuf, ScriptLanguage)> {
    if let Some(path) = find_named_script(dir, SCRIPT_STEM)
        && let Some(language) = ScriptLanguage::from_path(&path)
    {
        return Some((path, language));
    }

    let files = list_files(dir);
    if kind == CommandKind::Content
        && let Some(path) = files
            .iter()
            .find(|p| ScriptLanguage::from_path(p) == Some(ScriptLanguage::Content))
    {
        return Some((path.clone(), ScriptLanguage::Content));
    }

    let candidates: Vec<(&PathBuf, ScriptLanguage)> = files
        .iter()
        .filter_map(|p| {
            let language = ScriptLanguage::from_path(p).filter(|l| l.is_executable())?;
            let stem = p.file_stem()?.to_str()?.to_ascii_lowercase();
            let auxiliary =
                stem == CONFIG_STEM || stem.ends_with("_config") || stem == STARTUP_STEM;
            (!auxiliary).then_some((p, language))
        })
        .collect();
    if let [(path, language)] = candidates.as_slice() {
        return Some(((*path).clone(), *language));
    }

    let bundle = dir.join(BUNDLE_FILE);
    if matches!(
        kind,
        CommandKind::Link | CommandKind::Invoke | CommandKind::Url
    ) && bundle.is_file()
    {
        return Some((bundle, ScriptLanguage::Bundle));
    }
    None
}

struct TreeBuilder<'a> {
    templates: &'a BTreeMap<String, String>,
    /// Base id → times seen, for `#n` disambiguation.
    ids: HashMap<String, usize>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl TreeBuilder<'_> {
    fn diagnose(&mut self, path: &Path, message: impl Into<String>) {
        let diagnostic = ParseDiagnostic {
            path: path.to_path_buf(),
            message: message.into(),
        };
        debug!(path = %diagnostic.path.display(), reason = %diagnostic.message, "skipped component");
        self.diagnostics.push(diagnostic);
    }

    fn assign_id(&mut self, chain: &[String], name: &str, kind: ComponentKind) -> String {
        let mut parts = chain.to_vec();
        parts.push(clean_id_part(name));
        parts.push(kind.tag().to_string());
        let base = parts.join("-");
        let seen = self.ids.entry(base.clone()).or_insert(0);
        *seen += 1;
        if *seen == 1 {
            base
        } else {
            format!("{base}#{seen}")
        }
    }

    fn bundle(&mut self, dir: &Path) -> Option<BundleFile> {
        match read_bundle(dir) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.diagnose(dir, e.to_string());
                None
            },
        }
    }

    fn container(
        &mut self,
        dir: &Path,
        name: &str,
        kind: ComponentKind,
        chain: &[String],
        inherited: &[PathBuf],
        parent_id: Option<&str>,
    ) -> Component {
        let unique_id = self.assign_id(chain, name, kind);
        let search_paths = with_lib(dir, inherited);
        let bundle = self.bundle(dir);

        let mut child_chain = chain.to_vec();
        child_chain.push(clean_id_part(name));

        let mut children = Vec::new();
        for path in list_dirs(dir) {
            let Some(entry_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some((stem, child_kind)) = match_suffix(entry_name) else {
                continue;
            };
            if !kind.allows(child_kind) {
                self.diagnose(&path, format!("a {child_kind} cannot be placed in a {kind}"));
                continue;
            }
            let child_name = match kind {
                ComponentKind::Group(_) => strip_group_prefix(stem, name),
                _ => stem,
            };
            let child = if child_kind.is_command() {
                self.command(
                    &path,
                    child_name,
                    child_kind,
                    &child_chain,
                    &search_paths,
                    &unique_id,
                )
            } else {
                Some(self.container(
                    &path,
                    child_name,
                    child_kind,
                    &child_chain,
                    &search_paths,
                    Some(&unique_id),
                ))
            };
            children.extend(child);
        }

        let bundle_layout = bundle.as_ref().map(|b| b.layout.as_slice()).unwrap_or(&[]);
        if let Some(entries) = read_layout(dir, bundle_layout) {
            let (kept, omitted) = apply_layout(children, &entries);
            for name in omitted {
                debug!(container = %unique_id, component = %name, "left out by layout");
            }
            children = kept;
        }

        let mut component = bare_component(dir, name, kind, unique_id, parent_id);
        component.title = bundle.and_then(|b| b.title);
        if kind != ComponentKind::Extension {
            component.icons = resolve_icons(dir, name, kind);
        }
        component.children = children;
        component
    }

    fn command(
        &mut self,
        dir: &Path,
        name: &str,
        kind: ComponentKind,
        chain: &[String],
        inherited: &[PathBuf],
        parent_id: &str,
    ) -> Option<Component> {
        let ComponentKind::Command(command_kind) = kind else {
            return None;
        };
        let icons = resolve_icons(dir, name, kind);
        let Some((script_path, language)) = find_script(dir, command_kind) else {
            let reason = if icons.is_empty() {
                "no script found"
            } else {
                "icon present but no script found"
            };
            self.diagnose(dir, reason);
            return None;
        };
        let bundle = self.bundle(dir);
        let config_script_path =
            find_named_script(dir, CONFIG_STEM).filter(|p| *p != script_path);

        let literals = script_literals(&script_path, language);
        let mut resolved = resolve(literals.as_ref(), bundle.as_ref());
        template_metadata(&mut resolved, self.templates);

        let mut search_paths = vec![dir.to_path_buf()];
        search_paths.extend(with_lib(dir, inherited));

        let unique_id = self.assign_id(chain, name, kind);
        let mut component = bare_component(dir, name, kind, unique_id, Some(parent_id));
        component.title = resolved.title;
        component.icons = icons;
        component.command = Some(CommandSpec {
            script_path,
            config_script_path,
            language,
            availability: resolved.availability,
            search_paths,
            metadata: resolved.metadata,
        });
        Some(component)
    }
}
