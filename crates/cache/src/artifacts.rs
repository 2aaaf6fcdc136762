//! Artifact naming, atomic writes and cleanup, shared by every artifact kind
//! keyed by `(runtime hash, extension hash)`.

use std::path::{Path, PathBuf};

use ribbon_extensions::parse::clean_id_part;

use crate::{
    error::{Error, Result},
    hash::sha256_hex,
};

/// Bumped whenever a serialized artifact layout changes.
pub const FORMAT_VERSION: u32 = 1;

const KEY_LEN: usize = 16;

/// Key shared by the tree and binding artifacts of one extension state.
pub fn artifact_key(runtime_hash: &str, dir_hash: &str) -> String {
    let digest = sha256_hex(format!("{runtime_hash}|{FORMAT_VERSION}|{dir_hash}").as_bytes());
    digest[..KEY_LEN].to_string()
}

/// `<dir>/<extension>_<key><suffix>`.
pub fn artifact_path(dir: &Path, extension: &str, key: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{key}{suffix}", clean_id_part(extension)))
}

/// Write via a temp file and rename so readers never see a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, data).map_err(|e| Error::io_at(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io_at(path, e))?;
    Ok(())
}

/// Artifacts of `extension` with `suffix` whose key is not `keep`.
pub fn stale_artifacts(dir: &Path, extension: &str, suffix: &str, keep: &str) -> Vec<PathBuf> {
    let prefix = format!("{}_", clean_id_part(extension));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .is_some_and(|key| {
                    key.len() == KEY_LEN
                        && key.chars().all(|c| c.is_ascii_hexdigit())
                        && key != keep
                })
        })
        .collect()
}

/// Delete older artifacts. Failures are logged only.
pub fn remove_stale(dir: &Path, extension: &str, suffix: &str, keep: &str) -> usize {
    let mut removed = 0;
    for path in stale_artifacts(dir, extension, suffix, keep) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed stale artifact");
                removed += 1;
            },
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale artifact"),
        }
    }
    removed
}
