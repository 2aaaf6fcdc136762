//! Session Orchestrator: sequences discovery, cache, parsing, binding and UI
//! materialization for every extension, and aggregates the outcome.

pub mod error;
pub mod session;
pub mod startup;
pub mod summary;
#[cfg(feature = "file-watcher")]
pub mod watcher;

pub use {
    error::{Error, Result},
    session::Session,
    summary::{ExtensionReport, ExtensionStatus, LoadSummary, LoadedReport, Stage},
};
