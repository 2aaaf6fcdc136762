//! Layout overrides: `_layout` files and `layout:` lists in `bundle.yaml`.
//!
//! One entry per line. `---` puts a separator before the next item, `>>>`
//! a slide-out. `Name[title:Other]` overrides the item's title. Children
//! that are not listed are left out.

use std::{path::Path, sync::LazyLock};

use regex::Regex;

use crate::types::{Component, LocalizedText};

pub const LAYOUT_FILE: &str = "_layout";

const SEPARATOR: &str = "---";
const SLIDEOUT: &str = ">>>";

static DIRECTIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<name>.+?)\[(?P<key>[A-Za-z_]+):(?P<value>.*)\]$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEntry {
    Item { name: String, title: Option<String> },
    Separator,
    Slideout,
}

pub fn parse_layout<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<LayoutEntry> {
    lines
        .into_iter()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| match line {
            SEPARATOR => LayoutEntry::Separator,
            SLIDEOUT => LayoutEntry::Slideout,
            _ => parse_item(line),
        })
        .collect()
}

fn parse_item(line: &str) -> LayoutEntry {
    if let Some(re) = DIRECTIVE.as_ref()
        && let Some(caps) = re.captures(line)
    {
        let name = caps["name"].trim().to_string();
        let title = match &caps["key"] {
            "title" => Some(caps["value"].trim().to_string()),
            other => {
                tracing::debug!(directive = other, %name, "unsupported layout directive");
                None
            },
        };
        return LayoutEntry::Item { name, title };
    }
    LayoutEntry::Item {
        name: line.to_string(),
        title: None,
    }
}

/// Layout for `dir`: the `_layout` file wins over the bundle list.
pub fn read_layout(dir: &Path, bundle_layout: &[String]) -> Option<Vec<LayoutEntry>> {
    let path = dir.join(LAYOUT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) => return Some(parse_layout(raw.lines())),
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read layout file");
        },
        Err(_) => {},
    }
    (!bundle_layout.is_empty()).then(|| parse_layout(bundle_layout.iter().map(String::as_str)))
}

fn matches_entry(child: &Component, name: &str) -> bool {
    child.name == name
        || child
            .directory
            .file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f == name || f.rsplit_once('.').is_some_and(|(stem, _)| stem == name))
}

/// Reorder `children` by `entries`. Returns the kept children and the names
/// of those left out.
pub fn apply_layout(
    children: Vec<Component>,
    entries: &[LayoutEntry],
) -> (Vec<Component>, Vec<String>) {
    let mut pool: Vec<Option<Component>> = children.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(pool.len());
    let mut separator = false;
    let mut slideout = false;

    for entry in entries {
        match entry {
            LayoutEntry::Separator => separator = true,
            LayoutEntry::Slideout => slideout = true,
            LayoutEntry::Item { name, title } => {
                let Some(mut child) = pool
                    .iter_mut()
                    .find(|c| c.as_ref().is_some_and(|c| matches_entry(c, name)))
                    .and_then(Option::take)
                else {
                    tracing::debug!(%name, "layout entry matches no component");
                    continue;
                };
                if let Some(title) = title {
                    child.title = Some(LocalizedText::Plain(title.clone()));
                }
                child.layout.separator_before = separator;
                child.layout.slideout_before = slideout;
                separator = false;
                slideout = false;
                ordered.push(child);
            },
        }
    }

    let omitted = pool.into_iter().flatten().map(|c| c.name).collect();
    (ordered, omitted)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            kinds::{CommandKind, ComponentKind},
            types::{IconSet, LayoutHints},
        },
        std::path::PathBuf,
    };

    fn cmd(name: &str, dir: &str) -> Component {
        Component {
            name: name.to_string(),
            kind: ComponentKind::Command(CommandKind::Push),
            directory: PathBuf::from(dir),
            unique_id: name.to_string(),
            parent_id: None,
            title: None,
            icons: IconSet::default(),
            layout: LayoutHints::default(),
            children: Vec::new(),
            command: None,
        }
    }

    #[test]
    fn parses_entries() {
        let entries = parse_layout("A\n\n---\nB[title:Bee]\n>>>\nC[icon:x]\n".lines());
        assert_eq!(entries, vec![
            LayoutEntry::Item {
                name: "A".into(),
                title: None
            },
            LayoutEntry::Separator,
            LayoutEntry::Item {
                name: "B".into(),
                title: Some("Bee".into())
            },
            LayoutEntry::Slideout,
            LayoutEntry::Item {
                name: "C".into(),
                title: None
            },
        ]);
    }

    #[test]
    fn reorders_and_omits() {
        let children = vec![
            cmd("A", "p/A.pushbutton"),
            cmd("B", "p/B.pushbutton"),
            cmd("C", "p/C.pushbutton"),
        ];
        let entries = parse_layout(["C", "---", "A.pushbutton[title:First]"]);
        let (kept, omitted) = apply_layout(children, &entries);
        let names: Vec<_> = kept.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert!(kept[1].layout.separator_before);
        assert!(!kept[0].layout.separator_before);
        assert_eq!(kept[1].display_title("en_us"), "First");
        assert_eq!(omitted, vec!["B".to_string()]);
    }
}
