//! Archive creation and extraction
//!
//! Packages, rootfs images and pulled components are all gzip'ed tarballs or
//! plain directories. These helpers are blocking; async callers wrap them in
//! `spawn_blocking`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<ArchiveError> for crate::Error {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io(e) => Self::Io(e),
            other => Self::Io(io::Error::other(other.to_string())),
        }
    }
}

/// Returns `true` if `name` looks like a gzip'ed tarball.
pub fn is_tar_gz(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    extract_tar(GzDecoder::new(reader), dest_dir)
}

/// Extract a tar archive from a reader, returning the extracted file paths.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let relative_path: PathBuf = entry.path()?.components().collect();
        let absolute_path = dest_dir.join(&relative_path);

        // Reject entries escaping the destination
        if relative_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
            || !absolute_path.starts_with(dest_dir)
        {
            return Err(ArchiveError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute_path)?;
        extracted.push(absolute_path);
    }

    Ok(extracted)
}

/// An entry to place into a new archive.
#[derive(Debug, Clone)]
pub enum ArchiveEntry {
    /// Copy a file from disk under the given archive name.
    File { name: String, source: PathBuf },
    /// Write in-memory bytes under the given archive name.
    Bytes { name: String, data: Vec<u8> },
}

/// Write `entries` into a tarball at `dest`, gzip'ed when `compress` is set.
pub fn create_tar(dest: &Path, entries: &[ArchiveEntry], compress: bool) -> Result<(), ArchiveError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(dest)?);

    if compress {
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        append_entries(&mut builder, entries)?;
        let mut out = builder.into_inner()?.finish()?;
        io::Write::flush(&mut out)?;
    } else {
        let mut builder = tar::Builder::new(file);
        append_entries(&mut builder, entries)?;
        let mut out = builder.into_inner()?;
        io::Write::flush(&mut out)?;
    }
    Ok(())
}

fn append_entries<W: io::Write>(
    builder: &mut tar::Builder<W>,
    entries: &[ArchiveEntry],
) -> Result<(), ArchiveError> {
    for entry in entries {
        match entry {
            ArchiveEntry::File { name, source } => {
                builder.append_path_with_name(source, name)?;
            }
            ArchiveEntry::Bytes { name, data } => {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, data.as_slice())?;
            }
        }
    }
    Ok(())
}

/// Archive the contents of `src_dir` at `dest`, skipping paths for which
/// `exclude` returns `true` (paths are relative to `src_dir`).
pub fn archive_dir(
    src_dir: &Path,
    dest: &Path,
    compress: bool,
    exclude: impl Fn(&Path) -> bool,
) -> Result<(), ArchiveError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| ArchiveError::Archive(e.to_string()))?;
        if exclude(relative) {
            continue;
        }
        entries.push(ArchiveEntry::File {
            name: relative.to_string_lossy().replace('\\', "/"),
            source: entry.path().to_path_buf(),
        });
    }
    create_tar(dest, &entries, compress)
}

/// Recursively copy `src` into `dest`, creating `dest` if needed.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<u64, ArchiveError> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ArchiveError::Archive(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_tar_gz() {
        assert!(is_tar_gz("musl-1.2.tar.gz"));
        assert!(is_tar_gz("LWIP.TGZ"));
        assert!(!is_tar_gz("kernel.tar"));
    }

    #[test]
    fn test_archive_dir_and_extract() {
        let src = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::write(src.path().join("bin/app"), b"#!/bin/sh").unwrap();
        std::fs::write(src.path().join("image-config.json"), b"{}").unwrap();

        let out = tempdir().unwrap();
        let archive = out.path().join("rootfs.tar.gz");
        archive_dir(src.path(), &archive, true, |p| p == Path::new("image-config.json")).unwrap();

        let dest = out.path().join("extracted");
        let files = extract_tar_gz(&archive, &dest).unwrap();
        assert_eq!(files, vec![dest.join("bin/app")]);
        assert!(!dest.join("image-config.json").exists());
    }

    #[test]
    fn test_create_tar_with_bytes() {
        let out = tempdir().unwrap();
        let archive = out.path().join("pkg.tar.gz");
        create_tar(
            &archive,
            &[ArchiveEntry::Bytes {
                name: "manifest.json".to_string(),
                data: br#"{"name":"hello"}"#.to_vec(),
            }],
            true,
        )
        .unwrap();

        let dest = out.path().join("x");
        extract_tar_gz(&archive, &dest).unwrap();
        let content = std::fs::read_to_string(dest.join("manifest.json")).unwrap();
        assert_eq!(content, r#"{"name":"hello"}"#);
    }

    #[test]
    fn test_copy_dir() {
        let src = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("include/sys")).unwrap();
        std::fs::write(src.path().join("include/sys/types.h"), b"/* */").unwrap();
        std::fs::write(src.path().join("Makefile.uk"), b"LIB").unwrap();

        let dest = tempdir().unwrap();
        let target = dest.path().join("lib/musl");
        let copied = copy_dir(src.path(), &target).unwrap();

        assert_eq!(copied, 2);
        assert!(target.join("include/sys/types.h").is_file());
    }
}
