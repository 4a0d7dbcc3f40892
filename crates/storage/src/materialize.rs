//! Extraction of a validated archive into a fresh site directory.

use crate::error::{StorageError, StorageResult};
use crate::normalize::{normalize_structure, strip_authoring_metadata};
use crate::ownership::OwnershipPolicy;
use plinth_archive::{ValidatedArchive, sanitize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Create `target`, extract into it, normalize, then apply ownership.
///
/// `target` must not exist. If any step after its creation fails, the whole
/// directory is removed before the error is returned.
pub fn materialize_sync(
    archive_path: &Path,
    archive: &ValidatedArchive,
    target: &Path,
    ownership: &OwnershipPolicy,
) -> StorageResult<()> {
    match fs::create_dir(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(StorageError::AlreadyExists(target.display().to_string()));
        }
        Err(e) => return Err(StorageError::Io(e)),
    }

    let result = populate(archive_path, archive, target, ownership);
    if let Err(err) = &result {
        warn!(target = %target.display(), error = %err, "materialization failed, removing partial site");
        if let Err(cleanup) = fs::remove_dir_all(target) {
            warn!(target = %target.display(), error = %cleanup, "failed to remove partial site");
        }
    }
    result
}

fn populate(
    archive_path: &Path,
    archive: &ValidatedArchive,
    target: &Path,
    ownership: &OwnershipPolicy,
) -> StorageResult<()> {
    let written = extract_entries(archive_path, archive, target)?;
    let stripped = strip_authoring_metadata(target).map_err(extraction)?;
    let normalization = normalize_structure(target).map_err(extraction)?;
    ownership.apply(target)?;

    debug!(
        target = %target.display(),
        written,
        stripped,
        ?normalization,
        "site materialized"
    );
    Ok(())
}

fn extract_entries(
    archive_path: &Path,
    archive: &ValidatedArchive,
    target: &Path,
) -> StorageResult<u64> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| StorageError::Extraction(format!("reopening archive: {e}")))?;

    let mut written = 0u64;
    for accepted in archive.entries() {
        let mut entry = zip
            .by_index(accepted.index)
            .map_err(|e| StorageError::Extraction(format!("entry #{}: {e}", accepted.index)))?;

        // The archive on disk must still say what the validator saw.
        let reparsed = sanitize::normalize_entry_path(entry.name()).map_err(|_| {
            StorageError::InvalidPath(format!("unsafe entry path: {}", entry.name()))
        })?;
        if reparsed != accepted.path {
            return Err(StorageError::Extraction(format!(
                "entry #{} changed since validation",
                accepted.index
            )));
        }

        let dest = sanitize::resolve_within(target, &accepted.path).ok_or_else(|| {
            StorageError::InvalidPath(format!(
                "entry escapes site root: {}",
                accepted.path.display()
            ))
        })?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dest)?;
        // Never trust the declared size for the actual copy.
        let copied = io::copy(&mut (&mut entry).take(accepted.size + 1), &mut out)?;
        if copied > accepted.size {
            return Err(StorageError::Extraction(format!(
                "{} is larger than declared",
                accepted.path.display()
            )));
        }
        written += copied;
    }

    Ok(written)
}

fn extraction(e: io::Error) -> StorageError {
    StorageError::Extraction(e.to_string())
}
