//! Per-extension outcome of one load pass.

use std::path::PathBuf;

use {
    ribbon_bindings::{ModuleOrigin, ReconcileStats},
    ribbon_ui::MaterializeReport,
    serde::Serialize,
};

/// Pipeline stage an extension failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Hash,
    Parse,
    Bind,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hash => "hash",
            Self::Parse => "parse",
            Self::Bind => "bind",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedReport {
    pub dir_hash: String,
    pub from_cache: bool,
    pub origin: ModuleOrigin,
    pub commands: usize,
    pub parse_diagnostics: usize,
    /// Commands dropped for a missing script or a failed handler.
    pub dropped: Vec<String>,
    pub reconcile: ReconcileStats,
    pub ui: MaterializeReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExtensionStatus {
    Loaded(Box<LoadedReport>),
    Disabled,
    Failed { stage: Stage, error: String },
    /// Not reached because a newer reload superseded this pass.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionReport {
    pub name: String,
    pub directory: PathBuf,
    #[serde(flatten)]
    pub status: ExtensionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub generation: u64,
    pub superseded: bool,
    pub libraries: Vec<String>,
    pub extensions: Vec<ExtensionReport>,
    pub removed_elements: Vec<String>,
}

impl LoadSummary {
    pub fn report(&self, name: &str) -> Option<&ExtensionReport> {
        self.extensions.iter().find(|r| r.name == name)
    }

    pub fn loaded(&self) -> impl Iterator<Item = &ExtensionReport> {
        self.extensions
            .iter()
            .filter(|r| matches!(r.status, ExtensionStatus::Loaded(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExtensionReport> {
        self.extensions
            .iter()
            .filter(|r| matches!(r.status, ExtensionStatus::Failed { .. }))
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.report(name)
            .is_some_and(|r| matches!(r.status, ExtensionStatus::Loaded(_)))
    }

    pub fn loaded_report(&self, name: &str) -> Option<&LoadedReport> {
        match &self.report(name)?.status {
            ExtensionStatus::Loaded(report) => Some(report),
            _ => None,
        }
    }
}
