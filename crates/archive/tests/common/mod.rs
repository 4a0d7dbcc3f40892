#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build an in-memory zip from `(name, contents)` pairs.
pub fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip_with_dirs(&[], files)
}

/// Build an in-memory zip with explicit directory entries first.
pub fn build_zip_with_dirs(dirs: &[&str], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for dir in dirs {
        writer.add_directory(*dir, options).unwrap();
    }
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

pub fn simple_site() -> Vec<u8> {
    build_zip(&[
        ("index.html", b"<html><body>hi</body></html>"),
        ("style.css", b"body { color: red; }"),
    ])
}
