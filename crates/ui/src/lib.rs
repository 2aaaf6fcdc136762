//! UI Materializer: turns component trees plus binding modules into host UI
//! elements, and removes the elements a reload no longer produces.

pub mod headless;
pub mod host;
pub mod materializer;

pub use {
    headless::HeadlessUi,
    host::{ElementKind, HostUi, UiElement},
    materializer::{ElementFailure, MaterializeOptions, MaterializeReport, Materializer},
};
