//! The host UI surface the materializer drives.

use std::sync::Arc;

use {
    anyhow::Result,
    ribbon_bindings::CommandHandler,
    ribbon_extensions::{CommandKind, GroupKind, IconSet},
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "flavor")]
pub enum ElementKind {
    Tab,
    Panel,
    Group(GroupKind),
    Button(CommandKind),
    Separator,
    Slideout,
}

/// One host UI element, identified by the component's unique id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiElement {
    pub unique_id: String,
    pub kind: ElementKind,
    /// UI parent: the tab of a panel, the panel or group of a button.
    /// Stacks never appear here.
    pub parent: Option<String>,
    /// Stack the element is laid out in, if any.
    pub stack: Option<String>,
    /// Sibling this element follows under `parent`; `None` puts it first.
    pub after: Option<String>,
    pub extension: String,
    pub title: String,
    pub tooltip: Option<String>,
    pub icons: IconSet,
    pub help_url: Option<String>,
}

/// Host user-interface object model.
///
/// `ensure_*` calls find the element by unique id and update it, or create
/// it, then place it right after [`UiElement::after`] among its siblings.
/// Implementations run on the host's UI thread.
pub trait HostUi: Send {
    fn ensure_tab(&mut self, element: &UiElement) -> Result<()>;

    fn ensure_panel(&mut self, element: &UiElement) -> Result<()>;

    fn ensure_group(&mut self, element: &UiElement) -> Result<()>;

    /// Create the button or rebind its handler.
    fn ensure_button(&mut self, element: &UiElement, handler: Arc<dyn CommandHandler>)
    -> Result<()>;

    /// Separator or slide-out marker inside a panel.
    fn ensure_marker(&mut self, element: &UiElement) -> Result<()>;

    fn remove(&mut self, unique_id: &str) -> Result<()>;

    fn set_enabled(&mut self, unique_id: &str, enabled: bool) -> Result<()>;

    fn set_visible(&mut self, unique_id: &str, visible: bool) -> Result<()>;
}
