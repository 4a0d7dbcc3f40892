use std::path::{Component, Path, PathBuf};

/// Why an entry name could not be turned into a safe relative path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsafePath {
    /// `..` segment, absolute path or drive prefix.
    Escapes,
    /// NUL byte or nothing left after normalization.
    Invalid,
}

/// Normalize a raw archive entry name into a relative path of plain segments.
///
/// Both `/` and `\` are treated as separators, since archives built on
/// Windows frequently use the latter. Empty and `.` segments are dropped.
/// Any `..` segment is refused rather than resolved: a site archive has no
/// legitimate reason to climb.
pub fn normalize_entry_path(name: &str) -> Result<PathBuf, UnsafePath> {
    if name.contains('\0') {
        return Err(UnsafePath::Invalid);
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(UnsafePath::Escapes);
    }

    let mut result = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(UnsafePath::Escapes),
            // Drive letters and alternate data streams
            s if s.contains(':') => return Err(UnsafePath::Escapes),
            s => result.push(s),
        }
    }

    if result.as_os_str().is_empty() {
        return Err(UnsafePath::Invalid);
    }
    Ok(result)
}

/// Number of segments in an already-normalized relative path.
pub fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Join `relative` onto `base`, refusing anything that would land outside it.
///
/// `relative` must be made of normal components only; the lexical check
/// here is a second line of defence behind [`normalize_entry_path`].
pub fn resolve_within(base: &Path, relative: &Path) -> Option<PathBuf> {
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let joined = base.join(relative);
    is_within(base, &joined).then_some(joined)
}

/// Lexical containment check: `path` equals or sits below `base`.
pub fn is_within(base: &Path, path: &Path) -> bool {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return false;
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.starts_with(base)
}
