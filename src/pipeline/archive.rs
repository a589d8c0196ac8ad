//! Archive builder: zip a directory of rendered pages.
//!
//! Entries are named by their path relative to the source directory (with
//! `/` separators) and added in sorted order, so the same page set always
//! yields the same archive layout. Page images are already compressed, so
//! entries are stored rather than deflated.
//!
//! The archive is written to the destination path given by the caller and
//! deleted again if anything fails; callers write to a scratch name and only
//! publish it after this returns `Ok`.

use crate::error::ArchiveError;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every file under `src_dir` into `dest`. Returns the entry count.
pub fn build_archive(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let result = write_archive(src_dir, dest);
    if result.is_err() {
        if let Err(e) = fs::remove_file(dest) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove partial archive {}: {}", dest.display(), e);
            }
        }
    }
    result
}

fn write_archive(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let mut files = Vec::new();
    collect_files(src_dir, &mut files)?;
    files.sort();

    let out = File::create(dest).map_err(|source| ArchiveError::Write {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);

    for path in &files {
        let name = entry_name(src_dir, path);
        let mut input = File::open(path).map_err(|source| ArchiveError::Read {
            path: path.clone(),
            source,
        })?;

        zip.start_file(name.as_str(), options)?;
        io::copy(&mut input, &mut zip).map_err(|source| ArchiveError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        debug!("Archived {}", name);
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer).map_err(|source| ArchiveError::Write {
        path: dest.to_path_buf(),
        source,
    })?;

    Ok(files.len())
}

/// Recursive walk collecting regular files.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if entry.file_type().map_err(read_err)?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
