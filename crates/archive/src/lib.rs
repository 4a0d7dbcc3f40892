//! Validation of untrusted site archives.
//!
//! Nothing in this crate touches the filesystem. [`validate`] inspects the
//! entry listing and per-entry metadata of a zip archive held in memory and
//! either returns the accepted entries or the complete list of reasons the
//! archive was rejected.
//!
//! - `policy.rs` - Limits and extension lists
//! - `sanitize.rs` - Entry path normalization (zip-slip prevention)
//! - `validate.rs` - The single-pass validator

mod error;
pub mod policy;
pub mod sanitize;
mod validate;

pub use error::{Rejection, RejectionKind, ValidationError};
pub use policy::ArchivePolicy;
pub use validate::{AcceptedEntry, ValidatedArchive, validate};

/// Entry-point names recognized at any level of an archive.
pub const INDEX_NAMES: &[&str] = &[
    "index.html",
    "index.htm",
    "default.html",
    "home.html",
    "main.html",
];

/// Directory macOS archivers add alongside the real content.
pub const METADATA_DIR: &str = "__MACOSX";

/// Returns true if `file_name` is an HTML document.
pub fn is_html(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}
