//! Post-extraction clean-up: drop authoring metadata and make sure a site
//! has a browsable entry point at its root.

use plinth_archive::{METADATA_DIR, is_html};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Names that count as an entry point when found at the site root.
/// Also the preferred candidates when promoting a nested page.
pub const ROOT_ENTRY_NAMES: &[&str] = &["index.html", "index.htm", "default.html", "home.html"];

const METADATA_FILES: &[&str] = &[".DS_Store"];

/// What [`normalize_structure`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalization {
    /// The root already had an entry point.
    AlreadyRooted,
    /// A nested page was promoted; holds its path relative to the root.
    Promoted(PathBuf),
    /// No HTML anywhere; nothing to do.
    NoHtml,
}

/// Remove `__MACOSX` directories and `.DS_Store` files anywhere in the tree.
pub fn strip_authoring_metadata(root: &Path) -> io::Result<usize> {
    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::other)?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() && name == METADATA_DIR {
            doomed.push((entry.path().to_path_buf(), true));
            walker.skip_current_dir();
        } else if entry.file_type().is_file() && METADATA_FILES.contains(&name.as_ref()) {
            doomed.push((entry.path().to_path_buf(), false));
        }
    }

    for (path, is_dir) in &doomed {
        if *is_dir {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(doomed.len())
}

/// Ensure `root/index.html` (or another root entry name) exists.
///
/// When the root has no entry point, the best nested HTML page is chosen:
/// one named like a root entry, otherwise the first in traversal order. Its
/// siblings are copied up to the root without overwriting anything, then the
/// page itself is copied to `root/index.html` if that is still free. Copies,
/// not moves, so every original stays reachable at its archived path.
pub fn normalize_structure(root: &Path) -> io::Result<Normalization> {
    if ROOT_ENTRY_NAMES
        .iter()
        .any(|name| root.join(name).is_file())
    {
        return Ok(Normalization::AlreadyRooted);
    }

    let mut pages = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() && is_html(&entry.file_name().to_string_lossy()) {
            pages.push(entry.into_path());
        }
    }

    let chosen = pages
        .iter()
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|n| ROOT_ENTRY_NAMES.contains(&n.as_str()))
        })
        .or_else(|| pages.first());

    let Some(chosen) = chosen else {
        return Ok(Normalization::NoHtml);
    };

    if let Some(source_dir) = chosen.parent()
        && source_dir != root
    {
        for entry in fs::read_dir(source_dir)? {
            let entry = entry?;
            let dest = root.join(entry.file_name());
            if fs::symlink_metadata(&dest).is_ok() {
                continue;
            }
            if entry.file_type()?.is_dir() {
                copy_dir_all(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), &dest)?;
            }
        }
    }

    let root_index = root.join("index.html");
    if !root_index.exists() {
        fs::copy(chosen, &root_index)?;
    }

    let relative = chosen.strip_prefix(root).unwrap_or(chosen).to_path_buf();
    debug!(promoted = %relative.display(), "promoted nested entry point");
    Ok(Normalization::Promoted(relative))
}

fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn root_index_is_left_alone() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "home.html", "home");
        write(temp.path(), "sub/index.html", "nested");

        let outcome = normalize_structure(temp.path()).unwrap();
        assert_eq!(outcome, Normalization::AlreadyRooted);
        assert!(!temp.path().join("index.html").exists());
    }

    #[test]
    fn nested_index_is_promoted_with_siblings() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "site/index.html", "<h1>nested</h1>");
        write(temp.path(), "site/style.css", "body{}");
        write(temp.path(), "site/img/logo.svg", "<svg/>");

        let outcome = normalize_structure(temp.path()).unwrap();
        assert_eq!(
            outcome,
            Normalization::Promoted(PathBuf::from("site/index.html"))
        );

        let root = temp.path();
        assert_eq!(
            fs::read_to_string(root.join("index.html")).unwrap(),
            "<h1>nested</h1>"
        );
        assert!(root.join("style.css").is_file());
        assert!(root.join("img/logo.svg").is_file());
        // originals stay in place
        assert!(root.join("site/index.html").is_file());
        assert!(root.join("site/style.css").is_file());
    }

    #[test]
    fn preferred_name_beats_traversal_order() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a/about.html", "about");
        write(temp.path(), "b/default.html", "default");

        let outcome = normalize_structure(temp.path()).unwrap();
        assert_eq!(
            outcome,
            Normalization::Promoted(PathBuf::from("b/default.html"))
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("index.html")).unwrap(),
            "default"
        );
    }

    #[test]
    fn first_page_is_used_without_preferred_name() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "docs/b.html", "b");
        write(temp.path(), "docs/a.htm", "a");

        normalize_structure(temp.path()).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("index.html")).unwrap(),
            "a"
        );
    }

    #[test]
    fn existing_root_entries_are_not_overwritten() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "style.css", "root");
        write(temp.path(), "site/index.html", "page");
        write(temp.path(), "site/style.css", "nested");

        normalize_structure(temp.path()).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("style.css")).unwrap(),
            "root"
        );
    }

    #[test]
    fn no_html_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "style.css", "x");
        assert_eq!(
            normalize_structure(temp.path()).unwrap(),
            Normalization::NoHtml
        );
    }

    #[test]
    fn authoring_metadata_is_stripped() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "__MACOSX/._index.html", "fork");
        write(temp.path(), "site/__MACOSX/._a.css", "fork");
        write(temp.path(), "site/.DS_Store", "x");
        write(temp.path(), "index.html", "real");

        let removed = strip_authoring_metadata(temp.path()).unwrap();
        assert_eq!(removed, 3);
        assert!(!temp.path().join("__MACOSX").exists());
        assert!(!temp.path().join("site/__MACOSX").exists());
        assert!(!temp.path().join("site/.DS_Store").exists());
        assert!(temp.path().join("index.html").exists());
    }
}
