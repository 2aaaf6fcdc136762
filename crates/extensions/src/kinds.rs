//! Component kinds and the directory-suffix catalog.
//!
//! The catalog is a static table; containment rules are an exhaustive match
//! so adding a kind forces every rule to be revisited.

use serde::{Deserialize, Serialize};

/// Flavor of a [`ComponentKind::Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Pulldown,
    Split,
    SplitPush,
}

/// Flavor of a [`ComponentKind::Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Push,
    Toggle,
    Smart,
    Link,
    Invoke,
    Url,
    Content,
    PanelButton,
    /// Bound to a handler but never given a UI element.
    NoGui,
}

/// Every node kind a component tree can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "flavor")]
pub enum ComponentKind {
    Extension,
    Tab,
    Panel,
    Stack,
    Group(GroupKind),
    Command(CommandKind),
}

/// Whether an extension root carries UI or only shared library code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Ui,
    Library,
}

impl ExtensionKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Ui => ".extension",
            Self::Library => ".lib",
        }
    }
}

/// Directory suffix → kind.
const CATALOG: &[(&str, ComponentKind)] = &[
    (".tab", ComponentKind::Tab),
    (".panel", ComponentKind::Panel),
    (".stack", ComponentKind::Stack),
    (".stack2", ComponentKind::Stack),
    (".stack3", ComponentKind::Stack),
    (".pulldown", ComponentKind::Group(GroupKind::Pulldown)),
    (".splitbutton", ComponentKind::Group(GroupKind::Split)),
    (".splitpushbutton", ComponentKind::Group(GroupKind::SplitPush)),
    (".pushbutton", ComponentKind::Command(CommandKind::Push)),
    (".toggle", ComponentKind::Command(CommandKind::Toggle)),
    (".smartbutton", ComponentKind::Command(CommandKind::Smart)),
    (".linkbutton", ComponentKind::Command(CommandKind::Link)),
    (".invokebutton", ComponentKind::Command(CommandKind::Invoke)),
    (".urlbutton", ComponentKind::Command(CommandKind::Url)),
    (".content", ComponentKind::Command(CommandKind::Content)),
    (".panelbutton", ComponentKind::Command(CommandKind::PanelButton)),
    (".nobutton", ComponentKind::Command(CommandKind::NoGui)),
];

/// Directory names starting with these characters are never components.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = name.len().checked_sub(suffix.len())?;
    let (stem, tail) = (name.get(..cut)?, name.get(cut..)?);
    (!stem.is_empty() && tail.eq_ignore_ascii_case(suffix)).then_some(stem)
}

/// Match a directory name against the catalog, longest suffix first.
///
/// Returns the name with the suffix stripped and the matched kind.
pub fn match_suffix(dir_name: &str) -> Option<(&str, ComponentKind)> {
    if is_reserved(dir_name) {
        return None;
    }
    CATALOG
        .iter()
        .filter_map(|(suffix, kind)| {
            strip_suffix_ignore_case(dir_name, suffix).map(|stem| (suffix.len(), stem, *kind))
        })
        .max_by_key(|(len, ..)| *len)
        .map(|(_, stem, kind)| (stem, kind))
}

/// Match an extension root directory name (`*.extension` or `*.lib`).
pub fn match_root(dir_name: &str) -> Option<(&str, ExtensionKind)> {
    if is_reserved(dir_name) {
        return None;
    }
    [ExtensionKind::Ui, ExtensionKind::Library]
        .into_iter()
        .find_map(|kind| strip_suffix_ignore_case(dir_name, kind.suffix()).map(|s| (s, kind)))
}

impl ComponentKind {
    /// Whether `child` may appear directly under a container of this kind.
    pub fn allows(self, child: ComponentKind) -> bool {
        use ComponentKind::{Command, Extension, Group, Panel, Stack, Tab};
        match self {
            Extension => matches!(child, Tab),
            Tab => matches!(child, Panel),
            Panel => matches!(child, Stack | Group(_) | Command(_)),
            Stack | Group(_) => match child {
                Group(_) => matches!(self, Stack),
                Command(CommandKind::PanelButton) => false,
                Command(_) => true,
                Extension | Tab | Panel | Stack => false,
            },
            Command(_) => false,
        }
    }

    pub fn is_command(self) -> bool {
        matches!(self, Self::Command(_))
    }

    pub fn is_container(self) -> bool {
        !self.is_command()
    }

    /// Short tag used in unique ids and in listings.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Tab => "tab",
            Self::Panel => "panel",
            Self::Stack => "stack",
            Self::Group(GroupKind::Pulldown) => "pulldown",
            Self::Group(GroupKind::Split) => "splitbutton",
            Self::Group(GroupKind::SplitPush) => "splitpushbutton",
            Self::Command(CommandKind::Push) => "pushbutton",
            Self::Command(CommandKind::Toggle) => "toggle",
            Self::Command(CommandKind::Smart) => "smartbutton",
            Self::Command(CommandKind::Link) => "linkbutton",
            Self::Command(CommandKind::Invoke) => "invokebutton",
            Self::Command(CommandKind::Url) => "urlbutton",
            Self::Command(CommandKind::Content) => "content",
            Self::Command(CommandKind::PanelButton) => "panelbutton",
            Self::Command(CommandKind::NoGui) => "nobutton",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_suffixes() {
        assert_eq!(
            match_suffix("DoThing.pushbutton"),
            Some(("DoThing", ComponentKind::Command(CommandKind::Push)))
        );
        assert_eq!(
            match_suffix("Tools.splitpushbutton"),
            Some(("Tools", ComponentKind::Group(GroupKind::SplitPush)))
        );
        assert_eq!(
            match_suffix("Main.Stack3"),
            Some(("Main", ComponentKind::Stack))
        );
        assert_eq!(match_suffix("notes.txt"), None);
        assert_eq!(match_suffix(".pushbutton"), None);
    }

    #[test]
    fn reserved_names_never_match() {
        assert_eq!(match_suffix("_Hidden.pushbutton"), None);
        assert_eq!(match_suffix(".git"), None);
        assert_eq!(match_root("_old.extension"), None);
    }

    #[test]
    fn longest_suffix_wins() {
        assert_eq!(
            match_suffix("A.b.splitbutton"),
            Some(("A.b", ComponentKind::Group(GroupKind::Split)))
        );
        assert_eq!(
            match_suffix("Row.stack2"),
            Some(("Row", ComponentKind::Stack))
        );
    }

    #[test]
    fn roots() {
        assert_eq!(
            match_root("Tools.extension"),
            Some(("Tools", ExtensionKind::Ui))
        );
        assert_eq!(
            match_root("Shared.LIB"),
            Some(("Shared", ExtensionKind::Library))
        );
        assert_eq!(match_root("Tools.tab"), None);
    }

    #[test]
    fn containment_rules() {
        use ComponentKind::*;
        assert!(Extension.allows(Tab));
        assert!(!Extension.allows(Panel));
        assert!(Tab.allows(Panel));
        assert!(Panel.allows(Stack));
        assert!(Panel.allows(Command(CommandKind::PanelButton)));
        assert!(Stack.allows(Group(GroupKind::Pulldown)));
        assert!(!Stack.allows(Command(CommandKind::PanelButton)));
        assert!(Group(GroupKind::Split).allows(Command(CommandKind::Push)));
        assert!(!Group(GroupKind::Split).allows(Group(GroupKind::Pulldown)));
        assert!(!Command(CommandKind::Push).allows(Command(CommandKind::Push)));
    }
}
