//! Archive limits and extension lists.

use plinth_core::config::ArchiveConfig;
use std::collections::HashSet;

/// Extensions a static site may contain.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "json", "txt", "md", "png", "jpg", "jpeg", "gif", "svg", "ico",
    "webp", "woff", "woff2", "ttf", "eot", "otf", "xml", "map", "webmanifest", "pdf",
];

/// Executable and server-side script extensions, refused outright.
pub const DENIED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "sh", "php", "py", "rb", "pl", "jar", "war",
];

/// Limits the validator enforces.
#[derive(Clone, Debug)]
pub struct ArchivePolicy {
    /// Maximum size of the archive itself.
    pub max_archive_bytes: u64,
    /// Maximum number of entries, directories included.
    pub max_entries: usize,
    /// Maximum number of path segments in an entry.
    pub max_depth: usize,
    /// Maximum uncompressed size of one file.
    pub max_file_bytes: u64,
    allowed: HashSet<&'static str>,
    denied: HashSet<&'static str>,
}

impl ArchivePolicy {
    pub fn new(max_archive_bytes: u64, archive: &ArchiveConfig) -> Self {
        Self {
            max_archive_bytes,
            max_entries: archive.max_entries,
            max_depth: archive.max_depth,
            max_file_bytes: archive.max_file_bytes,
            allowed: ALLOWED_EXTENSIONS.iter().copied().collect(),
            denied: DENIED_EXTENSIONS.iter().copied().collect(),
        }
    }

    /// Extension check, case-insensitive. `Err` carries the refusal reason.
    ///
    /// Files without an extension (`CNAME`, `LICENSE`) are accepted.
    pub fn check_extension(&self, extension: Option<&str>) -> Result<(), String> {
        let Some(ext) = extension.filter(|e| !e.is_empty()) else {
            return Ok(());
        };
        let ext = ext.to_ascii_lowercase();
        if self.denied.contains(ext.as_str()) {
            return Err(format!("executable or script type '.{ext}' is not allowed"));
        }
        if !self.allowed.contains(ext.as_str()) {
            return Err(format!("file type '.{ext}' is not allowed"));
        }
        Ok(())
    }
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self::new(100 * 1024 * 1024, &ArchiveConfig::default())
    }
}
