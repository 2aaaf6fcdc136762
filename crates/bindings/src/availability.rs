//! Availability predicates: whether a command is enabled for a host state.
//!
//! Tags: none or `always` (no predicate), `zero-doc` (always true),
//! `active-doc`, `selection`, or a category rule. Category rules use
//! `a|b` (any listed category selected), `a&b` (all selected) or `a;b`
//! (selection categories are exactly the listed set). A leading `!`
//! negates the whole rule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const ZERO_DOC: &str = "zero-doc";
const ACTIVE_DOC: &str = "active-doc";
const SELECTION: &str = "selection";

/// What the host reports when it asks whether a command is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    pub has_active_document: bool,
    /// Category of every selected element (duplicates allowed).
    pub selection_categories: Vec<String>,
}

impl HostState {
    pub fn has_selection(&self) -> bool {
        !self.selection_categories.is_empty()
    }

    fn categories(&self) -> BTreeSet<String> {
        self.selection_categories
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Any,
    All,
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub mode: MatchMode,
    /// Lower-cased category names.
    pub categories: BTreeSet<String>,
}

impl CategoryRule {
    fn matches(&self, state: &HostState) -> bool {
        if !state.has_selection() {
            return false;
        }
        let selected = state.categories();
        match self.mode {
            MatchMode::Any => self.categories.iter().any(|c| selected.contains(c)),
            MatchMode::All => self.categories.iter().all(|c| selected.contains(c)),
            MatchMode::Exact => selected == self.categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Availability {
    Always,
    ZeroDoc,
    ActiveDocument,
    Selection,
    Categories { rule: CategoryRule, negate: bool },
}

impl Availability {
    /// Parse a raw context tag.
    pub fn parse(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::Always;
        };
        let (negate, body) = match tag.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, tag),
        };

        if !negate {
            match body.to_ascii_lowercase().as_str() {
                "always" => return Self::Always,
                ZERO_DOC => return Self::ZeroDoc,
                ACTIVE_DOC => return Self::ActiveDocument,
                SELECTION => return Self::Selection,
                _ => {},
            }
        }

        let (mode, sep) = if body.contains('&') {
            (MatchMode::All, '&')
        } else if body.contains('|') {
            (MatchMode::Any, '|')
        } else if body.contains(';') {
            (MatchMode::Exact, ';')
        } else {
            (MatchMode::Any, '|')
        };
        let categories = body
            .split(sep)
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty() && c != SELECTION)
            .collect::<BTreeSet<_>>();

        if categories.is_empty() {
            // Only keywords were listed, e.g. `selection;selection`.
            return if negate { Self::Always } else { Self::Selection };
        }
        Self::Categories {
            rule: CategoryRule { mode, categories },
            negate,
        }
    }

    /// Commands without a predicate are always enabled.
    pub fn needs_predicate(&self) -> bool {
        !matches!(self, Self::Always)
    }

    pub fn is_available(&self, state: &HostState) -> bool {
        match self {
            Self::Always | Self::ZeroDoc => true,
            Self::ActiveDocument => state.has_active_document,
            Self::Selection => state.has_active_document && state.has_selection(),
            Self::Categories { rule, negate } => {
                state.has_active_document && (rule.matches(state) != *negate)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(doc: bool, cats: &[&str]) -> HostState {
        HostState {
            has_active_document: doc,
            selection_categories: cats.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn keywords() {
        assert_eq!(Availability::parse(None), Availability::Always);
        assert_eq!(Availability::parse(Some("  ")), Availability::Always);
        assert!(!Availability::parse(None).needs_predicate());
        assert!(Availability::parse(Some("zero-doc")).needs_predicate());
        assert!(Availability::parse(Some("zero-doc")).is_available(&state(false, &[])));
        assert!(!Availability::parse(Some("active-doc")).is_available(&state(false, &[])));
        assert!(Availability::parse(Some("active-doc")).is_available(&state(true, &[])));

        let sel = Availability::parse(Some("Selection"));
        assert_eq!(sel, Availability::Selection);
        assert!(!sel.is_available(&state(true, &[])));
        assert!(sel.is_available(&state(true, &["Walls"])));
    }

    #[test]
    fn category_modes() {
        let any = Availability::parse(Some("Walls|Doors"));
        assert!(any.is_available(&state(true, &["doors", "Rooms"])));
        assert!(!any.is_available(&state(true, &["Rooms"])));

        let all = Availability::parse(Some("Walls&Doors"));
        assert!(all.is_available(&state(true, &["Walls", "Doors", "Rooms"])));
        assert!(!all.is_available(&state(true, &["Walls"])));

        let exact = Availability::parse(Some("Walls;Doors"));
        assert!(exact.is_available(&state(true, &["Walls", "Doors", "Walls"])));
        assert!(!exact.is_available(&state(true, &["Walls", "Doors", "Rooms"])));

        let single = Availability::parse(Some("Walls"));
        assert!(single.is_available(&state(true, &["Walls"])));
        assert!(!single.is_available(&state(false, &["Walls"])));
    }

    #[test]
    fn negation_and_keyword_lists() {
        let not_walls = Availability::parse(Some("!Walls"));
        assert!(not_walls.is_available(&state(true, &["Doors"])));
        assert!(not_walls.is_available(&state(true, &[])));
        assert!(!not_walls.is_available(&state(true, &["Walls"])));

        // `["selection", "Walls"]` arrives joined with `;`.
        let joined = Availability::parse(Some("selection;Walls"));
        assert!(joined.is_available(&state(true, &["Walls"])));
        assert_eq!(
            Availability::parse(Some("selection;selection")),
            Availability::Selection
        );
    }
}
