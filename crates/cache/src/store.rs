use std::path::{Path, PathBuf};

use {
    ribbon_config::RibbonConfig,
    ribbon_extensions::{Extension, ExtensionInfo},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    artifacts::{FORMAT_VERSION, artifact_key, artifact_path, remove_stale, write_atomic},
    error::{Error, Result},
};

pub const TREE_SUFFIX: &str = ".tree.json";

/// On-disk envelope around a serialized component tree.
#[derive(Debug, Serialize, Deserialize)]
struct TreeArtifact {
    format_version: u32,
    extension: String,
    directory: PathBuf,
    dir_hash: String,
    key: String,
    tree: Extension,
}

/// Persists parsed trees keyed by runtime and content hash.
///
/// Reads fail open: any problem reading an artifact is a cache miss.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    runtime_hash: String,
}

impl CacheStore {
    pub fn new(dir: PathBuf, runtime_hash: impl Into<String>) -> Self {
        Self {
            dir,
            runtime_hash: runtime_hash.into(),
        }
    }

    pub fn from_config(config: &RibbonConfig) -> Self {
        Self::new(config.cache.resolved_dir(), config.host.runtime_hash.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn runtime_hash(&self) -> &str {
        &self.runtime_hash
    }

    pub fn key_for(&self, dir_hash: &str) -> String {
        artifact_key(&self.runtime_hash, dir_hash)
    }

    pub fn tree_path(&self, extension: &str, dir_hash: &str) -> PathBuf {
        artifact_path(&self.dir, extension, &self.key_for(dir_hash), TREE_SUFFIX)
    }

    /// Whether a readable artifact matching `info.dir_hash` exists.
    pub fn is_valid(&self, info: &ExtensionInfo) -> bool {
        match self.read(info) {
            Ok(_) => true,
            Err(e) => {
                debug!(extension = %info.name, reason = %e, "cache miss");
                false
            },
        }
    }

    /// Load the cached tree for `info`. Any error is a cache miss.
    ///
    /// Reads only the artifact. Paths recorded under the directory the tree
    /// was parsed from are moved to `info.directory`; icon paths are as they
    /// were at save time.
    pub fn load(&self, info: &ExtensionInfo) -> Result<Extension> {
        let artifact = self.read(info)?;
        let mut extension = artifact.tree;
        extension.dir_hash = artifact.dir_hash;
        extension.directory = info.directory.clone();
        extension.enabled = info.enabled;
        if artifact.directory != info.directory {
            debug!(
                extension = %info.name,
                from = %artifact.directory.display(),
                to = %info.directory.display(),
                "extension moved since it was cached"
            );
            extension.rebase(&artifact.directory);
        }
        debug!(extension = %info.name, key = %artifact.key, "loaded tree from cache");
        Ok(extension)
    }

    /// Persist `extension`, then drop its older artifacts.
    pub fn save(&self, extension: &Extension) -> Result<PathBuf> {
        if extension.dir_hash.is_empty() {
            return Err(Error::MissingHash);
        }
        let key = self.key_for(&extension.dir_hash);
        let path = artifact_path(&self.dir, &extension.name, &key, TREE_SUFFIX);
        let artifact = TreeArtifact {
            format_version: FORMAT_VERSION,
            extension: extension.name.clone(),
            directory: extension.directory.clone(),
            dir_hash: extension.dir_hash.clone(),
            key: key.clone(),
            tree: extension.clone(),
        };
        let data = serde_json::to_vec_pretty(&artifact)?;
        write_atomic(&path, &data)?;
        remove_stale(&self.dir, &extension.name, TREE_SUFFIX, &key);
        debug!(extension = %extension.name, path = %path.display(), "saved tree to cache");
        Ok(path)
    }

    /// Save, logging instead of failing.
    pub fn save_or_warn(&self, extension: &Extension) {
        if let Err(e) = self.save(extension) {
            warn!(extension = %extension.name, error = %e, "failed to save cache artifact");
        }
    }

    /// Delete every artifact in the cache directory. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io_at(&self.dir, e)),
        };
        let mut removed = 0;
        for path in entries.flatten().map(|e| e.path()) {
            if path.is_file() && path.extension().is_some_and(|e| e == "json" || e == "tmp") {
                std::fs::remove_file(&path).map_err(|e| Error::io_at(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn read(&self, info: &ExtensionInfo) -> Result<TreeArtifact> {
        if info.dir_hash.is_empty() {
            return Err(Error::MissingHash);
        }
        let path = self.tree_path(&info.name, &info.dir_hash);
        let data = std::fs::read(&path).map_err(|e| Error::io_at(&path, e))?;
        let artifact: TreeArtifact = serde_json::from_slice(&data)?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(Error::stale(&path, "format version changed"));
        }
        if artifact.dir_hash != info.dir_hash {
            return Err(Error::stale(&path, "content hash mismatch"));
        }
        if artifact.extension != info.name || artifact.tree.kind != info.kind {
            return Err(Error::stale(&path, "artifact belongs to another extension"));
        }
        Ok(artifact)
    }
}
