#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use plinth_archive::{ArchivePolicy, ValidatedArchive, validate};
use plinth_storage::{FilesystemSites, OwnershipPolicy};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build an in-memory zip from `(name, contents)` pairs.
pub fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A validated archive written to disk, as the ingest path leaves it.
pub struct ZipFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub validated: ValidatedArchive,
}

impl ZipFixture {
    pub fn new(files: &[(&str, &[u8])]) -> Self {
        let bytes = build_zip(files);
        let validated = validate(&bytes, bytes.len() as u64, &ArchivePolicy::default())
            .expect("fixture archive should validate");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.zip");
        std::fs::write(&path, &bytes).unwrap();
        Self {
            dir,
            path,
            validated,
        }
    }

    /// Replace the archive on disk after validation.
    pub fn swap_bytes(&self, bytes: &[u8]) {
        std::fs::write(&self.path, bytes).unwrap();
    }
}

/// Filesystem storage rooted in `dir`, applying modes only.
pub async fn storage(dir: &Path) -> FilesystemSites {
    FilesystemSites::new(
        dir.join("sites"),
        dir.join("scratch"),
        OwnershipPolicy::modes_only(0o770, 0o660),
    )
    .await
    .unwrap()
}
