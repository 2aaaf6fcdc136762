//! Extension model and Directory Parser.
//!
//! An extension is a directory tree whose folder suffixes (`.tab`, `.panel`,
//! `.pushbutton`, ...) describe a typed component tree of UI commands.

pub mod discover;
pub mod error;
pub mod kinds;
pub mod layout;
pub mod literals;
pub mod metadata;
pub mod parse;
pub mod types;

pub use {
    discover::{ExtensionDiscoverer, FsExtensionDiscoverer},
    error::{Error, Result},
    kinds::{CommandKind, ComponentKind, ExtensionKind, GroupKind},
    parse::{ParseDiagnostic, ParseReport, parse, parse_with_report, refresh_icons},
    types::{
        CommandMetadata, CommandSpec, Component, Extension, ExtensionInfo, ExtensionManifest,
        IconSet, LayoutHints, LocalizedText, ScriptLanguage,
    },
};
