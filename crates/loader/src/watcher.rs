//! Filesystem watcher for extension search roots.
//!
//! Sends [`ExtensionWatchEvent::Changed`] when a file that can affect a parsed
//! tree is created, modified or removed. Icon swaps are ignored since icons
//! are re-resolved on every load anyway.

use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    ribbon_extensions::parse::is_image,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionWatchEvent {
    Changed { paths: Vec<PathBuf> },
}

/// Keep alive for as long as events are wanted.
pub struct ExtensionWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

/// Whether a change at `path` can alter a parsed tree.
pub fn is_relevant(path: &Path) -> bool {
    if is_image(path) {
        return false;
    }
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s.len() > 1 && s != "..")
    })
}

impl ExtensionWatcher {
    pub fn start(
        dirs: &[PathBuf],
        debounce: std::time::Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ExtensionWatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut paths = Vec::new();
                    for event in events {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            continue;
                        }
                        for path in &event.paths {
                            if is_relevant(path) && !paths.contains(path) {
                                debug!(path = %path.display(), "extension watcher event");
                                paths.push(path.clone());
                            }
                        }
                    }
                    if !paths.is_empty() {
                        let _ = tx.send(ExtensionWatchEvent::Changed { paths });
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "extension watcher error");
                    }
                },
            }
        })?;

        let mut watcher = Self {
            _debouncer: debouncer,
        };
        for dir in dirs {
            if dir.exists() {
                watcher._debouncer.watch(dir, RecursiveMode::Recursive)?;
                info!(dir = %dir.display(), "extension watcher: watching directory");
            }
        }
        Ok((watcher, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_and_hidden_files_are_ignored() {
        assert!(!is_relevant(Path::new("/x/A.extension/T.tab/icon.png")));
        assert!(!is_relevant(Path::new("/x/A.extension/.git/HEAD")));
        assert!(is_relevant(Path::new("/x/A.extension/T.tab/P.panel/B.pushbutton/script.py")));
        assert!(is_relevant(Path::new("/x/A.extension/T.tab/_layout")));
    }
}
