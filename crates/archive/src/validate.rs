use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{Rejection, RejectionKind, ValidationError};
use crate::policy::ArchivePolicy;
use crate::sanitize::{self, UnsafePath};
use crate::{INDEX_NAMES, METADATA_DIR, is_html};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// A file entry that passed every check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedEntry {
    /// Position in the archive's central directory.
    pub index: usize,
    /// Normalized relative path.
    pub path: PathBuf,
    /// Uncompressed size as declared by the archive.
    pub size: u64,
}

/// Outcome of a successful validation.
#[derive(Clone, Debug)]
pub struct ValidatedArchive {
    entries: Vec<AcceptedEntry>,
    total_entries: usize,
}

impl ValidatedArchive {
    /// Accepted file entries in archive order. Directories are not listed.
    pub fn entries(&self) -> &[AcceptedEntry] {
        &self.entries
    }

    /// Number of entries in the archive, directories included.
    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    /// Sum of declared uncompressed sizes of accepted files.
    pub fn uncompressed_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Inspect an archive without extracting it.
///
/// Size, container and entry-count failures end validation immediately;
/// every per-entry problem is collected so callers can report all of them.
pub fn validate(
    bytes: &[u8],
    declared_len: u64,
    policy: &ArchivePolicy,
) -> Result<ValidatedArchive, ValidationError> {
    let actual_len = bytes.len() as u64;
    if declared_len > policy.max_archive_bytes || actual_len > policy.max_archive_bytes {
        return Err(ValidationError::single(Rejection::archive(
            RejectionKind::PayloadTooLarge,
            format!(
                "archive is {} bytes, limit is {}",
                declared_len.max(actual_len),
                policy.max_archive_bytes
            ),
        )));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        ValidationError::single(Rejection::archive(
            RejectionKind::MalformedArchive,
            format!("not a valid zip archive: {e}"),
        ))
    })?;

    let total_entries = archive.len();
    if total_entries > policy.max_entries {
        return Err(ValidationError::single(Rejection::archive(
            RejectionKind::TooManyEntries,
            format!(
                "archive has {total_entries} entries, limit is {}",
                policy.max_entries
            ),
        )));
    }

    let mut rejections = Vec::new();
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut has_entry_point = false;

    for index in 0..total_entries {
        let file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                rejections.push(Rejection::entry(
                    RejectionKind::MalformedArchive,
                    &format!("#{index}"),
                    format!("unreadable entry: {e}"),
                ));
                continue;
            }
        };

        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let path = match sanitize::normalize_entry_path(&name) {
            Ok(path) => path,
            Err(UnsafePath::Escapes) => {
                rejections.push(Rejection::entry(
                    RejectionKind::PathTraversal,
                    &name,
                    "path escapes the site root",
                ));
                continue;
            }
            Err(UnsafePath::Invalid) => {
                rejections.push(Rejection::entry(
                    RejectionKind::MalformedArchive,
                    &name,
                    "entry has no usable path",
                ));
                continue;
            }
        };

        let mut ok = true;

        let depth = sanitize::depth(&path);
        if depth > policy.max_depth {
            rejections.push(Rejection::entry(
                RejectionKind::PathTooDeep,
                &name,
                format!("{depth} path segments, limit is {}", policy.max_depth),
            ));
            ok = false;
        }

        if file
            .unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
        {
            rejections.push(Rejection::entry(
                RejectionKind::DisallowedType,
                &name,
                "symbolic links are not allowed",
            ));
            ok = false;
        }

        let extension = path.extension().and_then(|e| e.to_str());
        if let Err(reason) = policy.check_extension(extension) {
            rejections.push(Rejection::entry(RejectionKind::DisallowedType, &name, reason));
            ok = false;
        }

        if file.size() > policy.max_file_bytes {
            rejections.push(Rejection::entry(
                RejectionKind::FileTooLarge,
                &name,
                format!(
                    "{} bytes uncompressed, limit is {}",
                    file.size(),
                    policy.max_file_bytes
                ),
            ));
            ok = false;
        }

        if ok && !seen.insert(path.clone()) {
            rejections.push(Rejection::entry(
                RejectionKind::MalformedArchive,
                &name,
                "duplicate entry",
            ));
            ok = false;
        }

        if !ok {
            continue;
        }

        // Resource-fork copies (site/__MACOSX/._index.html) are stripped after
        // extraction at any depth
        if path.components().any(|c| c.as_os_str() == METADATA_DIR) {
            entries.push(AcceptedEntry {
                index,
                path,
                size: file.size(),
            });
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if INDEX_NAMES.contains(&file_name.as_str()) || is_html(&file_name) {
            has_entry_point = true;
        }

        entries.push(AcceptedEntry {
            index,
            path,
            size: file.size(),
        });
    }

    if !has_entry_point {
        rejections.push(Rejection::archive(
            RejectionKind::NoEntryPoint,
            "archive contains no HTML document",
        ));
    }

    if !rejections.is_empty() {
        debug!(count = rejections.len(), "archive rejected");
        return Err(ValidationError { rejections });
    }

    debug!(
        entries = entries.len(),
        total_entries, "archive accepted"
    );
    Ok(ValidatedArchive {
        entries,
        total_entries,
    })
}
