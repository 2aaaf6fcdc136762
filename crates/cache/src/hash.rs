//! Content hash over the parser's input surface.
//!
//! Covers component directory names, script and metadata file names and
//! their contents. Icons and OS metadata files are left out, and nothing
//! time-based goes in, so a copied directory hashes the same.

use std::path::Path;

use {
    ribbon_extensions::{ScriptLanguage, kinds::match_suffix, layout::LAYOUT_FILE, parse::is_image},
    sha2::{Digest, Sha256},
    walkdir::{DirEntry, WalkDir},
};

use crate::error::{Error, Result};

/// Text files whose content shapes the tree.
const METADATA_FILES: &[&str] = &["bundle.yaml", "extension.json", LAYOUT_FILE];

const OS_METADATA: &[&str] = &["thumbs.db", "desktop.ini"];

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn name_of(entry: &DirEntry) -> &str {
    entry.file_name().to_str().unwrap_or_default()
}

/// Skip hidden entries and `_`-prefixed ones (except `_layout`).
fn is_walked(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = name_of(entry);
    if name.starts_with('.') {
        return false;
    }
    !name.starts_with('_') || name == LAYOUT_FILE
}

enum Contribution {
    Skip,
    NameOnly,
    NameAndContent,
}

fn classify(entry: &DirEntry) -> Contribution {
    let name = name_of(entry);
    if entry.file_type().is_dir() {
        return if match_suffix(name).is_some() {
            Contribution::NameOnly
        } else {
            Contribution::Skip
        };
    }
    let path = entry.path();
    if is_image(path) || OS_METADATA.iter().any(|m| name.eq_ignore_ascii_case(m)) {
        return Contribution::Skip;
    }
    if METADATA_FILES.iter().any(|m| name.eq_ignore_ascii_case(m)) {
        return Contribution::NameAndContent;
    }
    match ScriptLanguage::from_path(path) {
        Some(ScriptLanguage::Content) => Contribution::NameOnly,
        Some(_) => Contribution::NameAndContent,
        None => Contribution::Skip,
    }
}

/// Hash the extension directory at `root`.
pub fn dir_hash(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(Error::io_at(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut hasher = Sha256::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_walked);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io_at(&path, std::io::Error::other(e.to_string()))
        })?;
        if entry.depth() == 0 {
            continue;
        }
        let contribution = classify(&entry);
        if matches!(contribution, Contribution::Skip) {
            continue;
        }

        let rel: Vec<String> = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let tag = if entry.file_type().is_dir() { "d" } else { "f" };
        hasher.update(format!("{tag}:{}\n", rel.join("/")).as_bytes());

        if matches!(contribution, Contribution::NameAndContent) {
            let content =
                std::fs::read(entry.path()).map_err(|e| Error::io_at(entry.path(), e))?;
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    fn fixture() -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Tools.extension");
        let cmd = root.join("T.tab/P.panel/Go.pushbutton");
        fs::create_dir_all(&cmd).unwrap();
        fs::write(cmd.join("script.py"), "__title__ = 'Go'\n").unwrap();
        fs::write(cmd.join("icon.png"), "icon-v1").unwrap();
        (tmp, root)
    }

    fn cmd_dir(root: &Path) -> std::path::PathBuf {
        root.join("T.tab/P.panel/Go.pushbutton")
    }

    #[test]
    fn stable_for_unchanged_tree() {
        let (_tmp, root) = fixture();
        assert_eq!(dir_hash(&root).unwrap(), dir_hash(&root).unwrap());
    }

    #[test]
    fn independent_of_location() {
        let (_a, root_a) = fixture();
        let (_b, root_b) = fixture();
        assert_eq!(dir_hash(&root_a).unwrap(), dir_hash(&root_b).unwrap());
    }

    #[test]
    fn icons_do_not_change_hash() {
        let (_tmp, root) = fixture();
        let before = dir_hash(&root).unwrap();
        let cmd = cmd_dir(&root);
        fs::write(cmd.join("icon.png"), "icon-v2").unwrap();
        fs::write(cmd.join("icon.dark.png"), "dark").unwrap();
        assert_eq!(dir_hash(&root).unwrap(), before);
        fs::remove_file(cmd.join("icon.png")).unwrap();
        assert_eq!(dir_hash(&root).unwrap(), before);
    }

    #[test]
    fn scripts_and_names_change_hash() {
        let (_tmp, root) = fixture();
        let cmd = cmd_dir(&root);
        let base = dir_hash(&root).unwrap();

        fs::write(cmd.join("script.py"), "__title__ = 'Go!'\n").unwrap();
        let edited = dir_hash(&root).unwrap();
        assert_ne!(edited, base);

        fs::write(cmd.join("config.py"), "").unwrap();
        let added = dir_hash(&root).unwrap();
        assert_ne!(added, edited);

        fs::rename(&cmd, root.join("T.tab/P.panel/Run.pushbutton")).unwrap();
        assert_ne!(dir_hash(&root).unwrap(), added);
    }

    #[test]
    fn layout_counts_but_other_files_do_not() {
        let (_tmp, root) = fixture();
        let base = dir_hash(&root).unwrap();
        fs::write(root.join("T.tab/P.panel/readme.md"), "notes").unwrap();
        fs::write(root.join("T.tab/P.panel/.DS_Store"), "x").unwrap();
        fs::create_dir_all(root.join("T.tab/P.panel/_archive.pushbutton")).unwrap();
        assert_eq!(dir_hash(&root).unwrap(), base);
        fs::write(root.join("T.tab/P.panel/_layout"), "Go\n").unwrap();
        assert_ne!(dir_hash(&root).unwrap(), base);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(dir_hash(&tmp.path().join("nope.extension")).is_err());
    }
}
