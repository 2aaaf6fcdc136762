use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::kinds::{ComponentKind, ExtensionKind, match_root};

// ── Text & icons ─────────────────────────────────────────────────────────────

/// A title or tooltip, either plain or keyed by locale code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

/// Locale used when the requested one has no entry.
pub const FALLBACK_LOCALE: &str = "en_us";

impl LocalizedText {
    /// Pick the text for `locale`, falling back to English, then to any entry.
    pub fn resolve(&self, locale: &str) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Localized(map) => map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(locale))
                .or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(FALLBACK_LOCALE))
                })
                .or_else(|| map.iter().next())
                .map(|(_, v)| v.as_str()),
        }
    }

    pub fn map_text(&mut self, mut f: impl FnMut(&str) -> String) {
        match self {
            Self::Plain(text) => *text = f(text),
            Self::Localized(map) => map.values_mut().for_each(|v| *v = f(v)),
        }
    }
}

impl From<&str> for LocalizedText {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_string())
    }
}

/// Icon files resolved for a component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconSet {
    pub icon: Option<PathBuf>,
    pub dark: Option<PathBuf>,
    /// Toggle commands: shown while the toggle is on.
    pub on: Option<PathBuf>,
    pub off: Option<PathBuf>,
}

impl IconSet {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none() && self.dark.is_none() && self.on.is_none() && self.off.is_none()
    }
}

/// Layout decorations placed before a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutHints {
    pub separator_before: bool,
    pub slideout_before: bool,
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Script language, inferred from the script file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptLanguage {
    Python,
    CSharp,
    VisualBasic,
    Ruby,
    Dynamo,
    Grasshopper,
    /// Family/content file loaded by the host rather than executed.
    Content,
    /// `bundle.yaml` standing in for a script (link, invoke and url commands).
    Bundle,
}

impl ScriptLanguage {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Self::Python),
            "cs" => Some(Self::CSharp),
            "vb" => Some(Self::VisualBasic),
            "rb" => Some(Self::Ruby),
            "dyn" => Some(Self::Dynamo),
            "gh" | "ghx" => Some(Self::Grasshopper),
            "rfa" => Some(Self::Content),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Key into the `engines` config table.
    pub fn engine_key(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::CSharp => "csharp",
            Self::VisualBasic => "vb",
            Self::Ruby => "ruby",
            Self::Dynamo => "dynamo",
            Self::Grasshopper => "grasshopper",
            Self::Content => "content",
            Self::Bundle => "bundle",
        }
    }

    /// Languages executed by an external engine.
    pub fn is_executable(self) -> bool {
        !matches!(self, Self::Content | Self::Bundle)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineFlags {
    pub clean: bool,
    pub full_frame: bool,
    pub persistent: bool,
}

/// Metadata gathered from script literals and `bundle.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandMetadata {
    pub tooltip: Option<LocalizedText>,
    pub author: Option<String>,
    pub help_url: Option<String>,
    pub min_host_version: Option<u32>,
    pub max_host_version: Option<u32>,
    pub beta: bool,
    pub options: Vec<String>,
    pub engine: EngineFlags,
    pub assembly: Option<String>,
    pub command_class: Option<String>,
    pub availability_class: Option<String>,
    pub hyperlink: Option<String>,
}

impl CommandMetadata {
    /// Whether a host of `version` should show this command.
    pub fn supports_host(&self, version: u32) -> bool {
        self.min_host_version.is_none_or(|min| version >= min)
            && self.max_host_version.is_none_or(|max| version <= max)
    }
}

/// Everything a leaf command needs to be bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub script_path: PathBuf,
    #[serde(default)]
    pub config_script_path: Option<PathBuf>,
    pub language: ScriptLanguage,
    /// Raw context tag. `None` means always available.
    #[serde(default)]
    pub availability: Option<String>,
    /// Import roots for the script, nearest first.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub metadata: CommandMetadata,
}

// ── Tree ─────────────────────────────────────────────────────────────────────

/// One node of the component tree.
///
/// The parent link is a key (`parent_id`) rather than a pointer so the tree
/// stays plain owned data that serializes as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub directory: PathBuf,
    pub unique_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: Option<LocalizedText>,
    #[serde(default)]
    pub icons: IconSet,
    #[serde(default)]
    pub layout: LayoutHints,
    #[serde(default)]
    pub children: Vec<Component>,
    #[serde(default)]
    pub command: Option<CommandSpec>,
}

impl Component {
    pub fn display_title(&self, locale: &str) -> String {
        self.title
            .as_ref()
            .and_then(|t| t.resolve(locale))
            .unwrap_or(&self.name)
            .to_string()
    }

    pub fn icon_path(&self) -> Option<&Path> {
        self.icons.icon.as_deref()
    }

    pub fn is_command(&self) -> bool {
        self.kind.is_command()
    }

    /// Leaf commands beneath (or equal to) this node, in tree order.
    pub fn commands(&self) -> Vec<&Component> {
        let mut out = Vec::new();
        self.collect_commands(&mut out);
        out
    }

    fn collect_commands<'a>(&'a self, out: &mut Vec<&'a Component>) {
        if self.is_command() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_commands(out);
        }
    }

    pub fn has_commands(&self) -> bool {
        self.is_command() || self.children.iter().any(Component::has_commands)
    }

    pub fn find(&self, unique_id: &str) -> Option<&Component> {
        if self.unique_id == unique_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(unique_id))
    }

    /// Visit every node depth-first, parents before children.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Component)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    /// Remove containers with no command anywhere beneath them.
    ///
    /// Returns the unique ids of the removed containers.
    pub fn prune(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.prune_into(&mut removed);
        removed
    }

    fn prune_into(&mut self, removed: &mut Vec<String>) {
        for child in &mut self.children {
            child.prune_into(removed);
        }
        self.children.retain(|child| {
            let keep = child.has_commands();
            if !keep {
                removed.push(child.unique_id.clone());
            }
            keep
        });
    }

    /// Drop commands rejected by `keep`. Returns the dropped unique ids.
    pub fn retain_commands(&mut self, keep: &mut impl FnMut(&Component) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.retain_commands_into(keep, &mut dropped);
        dropped
    }

    fn retain_commands_into(
        &mut self,
        keep: &mut impl FnMut(&Component) -> bool,
        dropped: &mut Vec<String>,
    ) {
        self.children.retain(|child| {
            if child.is_command() && !keep(child) {
                dropped.push(child.unique_id.clone());
                return false;
            }
            true
        });
        for child in &mut self.children {
            child.retain_commands_into(keep, dropped);
        }
    }
}

/// Contents of an extension's `extension.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionManifest {
    pub description: Option<String>,
    pub author: Option<String>,
    /// `{{key}}` substitutions applied to command text fields.
    pub templates: BTreeMap<String, String>,
}

/// A parsed extension: the root of one component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub kind: ExtensionKind,
    pub directory: PathBuf,
    /// Content hash of the directory, filled in by the cache layer.
    #[serde(default)]
    pub dir_hash: String,
    /// Roots contributed by library extensions and configuration.
    #[serde(default)]
    pub library_paths: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub manifest: ExtensionManifest,
    #[serde(default)]
    pub startup_script: Option<PathBuf>,
    pub root: Component,
}

fn default_true() -> bool {
    true
}

impl Extension {
    pub fn tabs(&self) -> &[Component] {
        &self.root.children
    }

    pub fn commands(&self) -> Vec<&Component> {
        self.root.commands()
    }

    pub fn unique_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        collect_ids(&self.root, &mut ids);
        ids
    }

    pub fn find(&self, unique_id: &str) -> Option<&Component> {
        self.root.find(unique_id)
    }

    /// Drop the given commands and prune containers left empty.
    pub fn remove_commands(&mut self, unique_ids: &HashSet<String>) -> Vec<String> {
        let dropped = self
            .root
            .retain_commands(&mut |c| !unique_ids.contains(&c.unique_id));
        self.root.prune();
        dropped
    }

    /// Drop commands whose script no longer exists on disk.
    pub fn drop_missing_scripts(&mut self) -> Vec<String> {
        let dropped = self.root.retain_commands(&mut |c| {
            c.command
                .as_ref()
                .is_some_and(|spec| spec.script_path.is_file())
        });
        if !dropped.is_empty() {
            self.root.prune();
        }
        dropped
    }

    /// Re-root every path recorded under `from` onto `self.directory`.
    ///
    /// Trees read back from the cache carry the paths of the directory they
    /// were parsed from; the content hash does not depend on location.
    /// Paths outside `from` (library roots) are kept.
    pub fn rebase(&mut self, from: &Path) {
        let to = self.directory.clone();
        if from == to {
            return;
        }
        if let Some(script) = &mut self.startup_script {
            rebase_path(script, from, &to);
        }
        self.root.visit_mut(&mut |c| {
            rebase_path(&mut c.directory, from, &to);
            for icon in [&mut c.icons.icon, &mut c.icons.dark, &mut c.icons.on, &mut c.icons.off]
                .into_iter()
                .flatten()
            {
                rebase_path(icon, from, &to);
            }
            if let Some(spec) = &mut c.command {
                rebase_path(&mut spec.script_path, from, &to);
                if let Some(config) = &mut spec.config_script_path {
                    rebase_path(config, from, &to);
                }
                for path in &mut spec.search_paths {
                    rebase_path(path, from, &to);
                }
            }
        });
    }

    /// Search paths for a command: its own roots, then the extension's libraries.
    pub fn search_paths_for(&self, command: &CommandSpec) -> Vec<PathBuf> {
        let mut paths = command.search_paths.clone();
        for lib in &self.library_paths {
            if !paths.contains(lib) {
                paths.push(lib.clone());
            }
        }
        paths
    }
}

fn rebase_path(path: &mut PathBuf, from: &Path, to: &Path) {
    if let Ok(rest) = path.strip_prefix(from) {
        *path = if rest.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(rest)
        };
    }
}

fn collect_ids(component: &Component, ids: &mut BTreeSet<String>) {
    ids.insert(component.unique_id.clone());
    for child in &component.children {
        collect_ids(child, ids);
    }
}

/// What discovery knows about an extension before it is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub kind: ExtensionKind,
    pub directory: PathBuf,
    pub enabled: bool,
    /// Empty until the cache layer hashes the directory.
    #[serde(default)]
    pub dir_hash: String,
}

impl ExtensionInfo {
    /// Describe `dir` if its name carries an extension-root suffix.
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let file_name = dir.file_name()?.to_str()?;
        let (name, kind) = match_root(file_name)?;
        Some(Self {
            name: name.to_string(),
            kind,
            directory: dir.to_path_buf(),
            enabled: true,
            dir_hash: String::new(),
        })
    }
}
