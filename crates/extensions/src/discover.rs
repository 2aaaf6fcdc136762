use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use {async_trait::async_trait, ribbon_config::RibbonConfig};

use crate::{kinds::is_reserved, types::ExtensionInfo};

/// Finds extension roots.
#[async_trait]
pub trait ExtensionDiscoverer: Send + Sync {
    /// Return every extension root found, UI and library alike.
    async fn discover(&self) -> anyhow::Result<Vec<ExtensionInfo>>;
}

/// Scans search roots one level deep for `*.extension` and `*.lib` folders.
pub struct FsExtensionDiscoverer {
    /// Roots in priority order; an extension name found twice keeps the first.
    search_paths: Vec<PathBuf>,
    disabled: Vec<String>,
}

impl FsExtensionDiscoverer {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            disabled: Vec::new(),
        }
    }

    pub fn from_config(config: &RibbonConfig) -> Self {
        Self {
            search_paths: config.extensions.search_paths.clone(),
            disabled: config.extensions.disabled.clone(),
        }
    }

    /// Names that should be marked disabled.
    pub fn with_disabled(mut self, disabled: Vec<String>) -> Self {
        self.disabled = disabled;
        self
    }

    fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

#[async_trait]
impl ExtensionDiscoverer for FsExtensionDiscoverer {
    async fn discover(&self) -> anyhow::Result<Vec<ExtensionInfo>> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for base in &self.search_paths {
            if !base.is_dir() {
                tracing::debug!(path = %base.display(), "search path missing, skipped");
                continue;
            }
            for mut info in scan_root(base) {
                let key = (info.kind, info.name.to_ascii_lowercase());
                if !seen.insert(key) {
                    tracing::warn!(
                        name = %info.name,
                        path = %info.directory.display(),
                        "duplicate extension name, keeping the first one found"
                    );
                    continue;
                }
                info.enabled = self.is_enabled(&info.name);
                found.push(info);
            }
        }

        Ok(found)
    }
}

/// Extension roots directly under `base`, sorted by directory name.
fn scan_root(base: &Path) -> Vec<ExtensionInfo> {
    let entries = match std::fs::read_dir(base) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(path = %base.display(), %e, "failed to read search path");
            return Vec::new();
        },
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| !is_reserved(f))
        })
        .collect();
    dirs.sort();
    dirs.iter().filter_map(|d| ExtensionInfo::from_dir(d)).collect()
}
