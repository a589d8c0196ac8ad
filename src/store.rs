//! Filesystem-backed job store.
//!
//! Three sibling directories under the data directory, each keyed by job
//! identifier:
//!
//! ```text
//! uploads/<id>.pdf          uploaded document
//! outputs/<id>/page_N.ext   rendered page set
//! zips/<id>.zip             output archive
//! ```
//!
//! There is no index file. The identifier in the path is the only link
//! between the three artifacts of one job. All methods are blocking; callers
//! on the async runtime go through `spawn_blocking`.

use crate::config::{OutputFormat, ServerConfig};
use crate::error::StoreError;
use crate::job::JobId;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// The three storage namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Upload,
    Pages,
    Archive,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Upload, ArtifactKind::Pages, ArtifactKind::Archive];
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Upload => "upload",
            ArtifactKind::Pages => "page set",
            ArtifactKind::Archive => "archive",
        })
    }
}

/// One directory entry found by [`JobStore::list`].
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub kind: ArtifactKind,
    /// File or directory name as found on disk.
    pub name: String,
    /// Parsed from the name; `None` for files the service did not create.
    pub job_id: Option<JobId>,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Handle to the three storage directories. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobStore {
    uploads: PathBuf,
    outputs: PathBuf,
    zips: PathBuf,
}

impl JobStore {
    /// Open the store, creating any missing directory.
    pub fn open(config: &ServerConfig) -> Result<Self, StoreError> {
        let store = Self {
            uploads: config.uploads_dir(),
            outputs: config.outputs_dir(),
            zips: config.zips_dir(),
        };
        for kind in ArtifactKind::ALL {
            let dir = store.dir(kind);
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        Ok(store)
    }

    /// Directory holding every artifact of `kind`.
    pub fn dir(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Upload => &self.uploads,
            ArtifactKind::Pages => &self.outputs,
            ArtifactKind::Archive => &self.zips,
        }
    }

    /// Location of `id`'s artifact of `kind`, whether or not it exists.
    pub fn path(&self, kind: ArtifactKind, id: JobId) -> PathBuf {
        match kind {
            ArtifactKind::Upload => self.uploads.join(format!("{id}.pdf")),
            ArtifactKind::Pages => self.outputs.join(id.to_string()),
            ArtifactKind::Archive => self.zips.join(format!("{id}.zip")),
        }
    }

    /// Write the uploaded document and return its path.
    pub fn put_upload(&self, id: JobId, content: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.path(ArtifactKind::Upload, id);
        fs::write(&path, content).map_err(|e| StoreError::io(&path, e))?;
        debug!("Stored upload {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    /// Create `id`'s (empty) page directory and return it.
    pub fn create_page_set(&self, id: JobId) -> Result<PathBuf, StoreError> {
        let dir = self.path(ArtifactKind::Pages, id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }

    /// Write one rendered page as `page_<page>.<ext>` (1-indexed).
    pub fn put_page(
        &self,
        id: JobId,
        page: usize,
        format: OutputFormat,
        content: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let dir = self.path(ArtifactKind::Pages, id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let path = dir.join(page_file_name(page, format));
        fs::write(&path, content).map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// Scratch path the archive builder writes to before publishing.
    pub fn partial_archive_path(&self, id: JobId) -> PathBuf {
        self.zips.join(format!("{id}.zip.partial"))
    }

    /// Move a finished archive into place under `id`.
    pub fn publish_archive(&self, id: JobId, built: &Path) -> Result<PathBuf, StoreError> {
        let path = self.path(ArtifactKind::Archive, id);
        fs::rename(built, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// Open `id`'s archive for reading, with its length in bytes.
    pub fn open_archive(&self, id: JobId) -> Result<(fs::File, u64), StoreError> {
        let path = self.path(ArtifactKind::Archive, id);
        let file = fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                kind: ArtifactKind::Archive,
                id: id.to_string(),
            },
            _ => StoreError::io(&path, e),
        })?;
        let len = file.metadata().map_err(|e| StoreError::io(&path, e))?.len();
        Ok((file, len))
    }

    /// Remove `id`'s artifact of `kind`. Removing something already gone is
    /// not an error.
    pub fn delete(&self, kind: ArtifactKind, id: JobId) -> Result<(), StoreError> {
        let path = self.path(kind, id);
        remove_path(&path).map_err(|e| StoreError::io(&path, e))
    }

    /// Every entry currently in the `kind` directory.
    ///
    /// Entries that vanish between the directory scan and the metadata read
    /// (a concurrent delete) are skipped.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<StoredArtifact>, StoreError> {
        let dir = self.dir(kind);
        let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(dir, e))?;
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            let modified = metadata.modified().map_err(|e| StoreError::io(&path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(StoredArtifact {
                kind,
                job_id: job_id_from_name(&name),
                name,
                path,
                modified,
                is_dir: metadata.is_dir(),
            });
        }
        Ok(out)
    }
}

/// `page_<n>.<ext>` for the 1-indexed page `n`.
pub fn page_file_name(page: usize, format: OutputFormat) -> String {
    format!("page_{page}.{}", format.extension())
}

/// Remove a file, or a directory and everything under it.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Recover the job identifier from `<id>`, `<id>.pdf`, `<id>.zip` or
/// `<id>.zip.partial`.
fn job_id_from_name(name: &str) -> Option<JobId> {
    let stem = name.split('.').next().unwrap_or(name);
    JobId::parse(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, JobStore) {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::builder().data_dir(tmp.path()).build().unwrap();
        let store = JobStore::open(&config).unwrap();
        (tmp, store)
    }

    #[test]
    fn open_creates_all_namespaces() {
        let (tmp, _store) = store();
        for name in ["uploads", "outputs", "zips"] {
            assert!(tmp.path().join(name).is_dir(), "{name} missing");
        }
    }

    #[test]
    fn layout_follows_naming_convention() {
        let (_tmp, store) = store();
        let id = JobId::new();
        let upload = store.put_upload(id, b"%PDF-1.4").unwrap();
        assert!(upload.ends_with(format!("uploads/{id}.pdf")));

        let page = store.put_page(id, 2, OutputFormat::Jpeg, b"jpg").unwrap();
        assert!(page.ends_with(format!("outputs/{id}/page_2.jpg")));

        assert!(store
            .path(ArtifactKind::Archive, id)
            .ends_with(format!("zips/{id}.zip")));
    }

    #[test]
    fn open_archive_reports_not_found() {
        let (_tmp, store) = store();
        let err = store.open_archive(JobId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: ArtifactKind::Archive, .. }));
    }

    #[test]
    fn publish_then_open_archive() {
        let (_tmp, store) = store();
        let id = JobId::new();
        let partial = store.partial_archive_path(id);
        fs::write(&partial, b"PK\x05\x06").unwrap();

        store.publish_archive(id, &partial).unwrap();
        assert!(!partial.exists());

        let (_file, len) = store.open_archive(id).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn delete_is_recursive_and_idempotent() {
        let (_tmp, store) = store();
        let id = JobId::new();
        store.put_page(id, 1, OutputFormat::Png, b"a").unwrap();
        store.put_page(id, 2, OutputFormat::Png, b"b").unwrap();

        store.delete(ArtifactKind::Pages, id).unwrap();
        assert!(!store.path(ArtifactKind::Pages, id).exists());
        store.delete(ArtifactKind::Pages, id).unwrap();
    }

    #[test]
    fn list_recovers_job_ids() {
        let (_tmp, store) = store();
        let id = JobId::new();
        store.put_upload(id, b"x").unwrap();
        fs::write(store.dir(ArtifactKind::Upload).join("stray.txt"), b"?").unwrap();

        let mut listed = store.list(ArtifactKind::Upload).unwrap();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(listed.len(), 2);

        let ours = listed.iter().find(|a| a.job_id == Some(id)).unwrap();
        assert!(!ours.is_dir);
        assert_eq!(ours.kind, ArtifactKind::Upload);
        assert!(listed.iter().any(|a| a.name == "stray.txt" && a.job_id.is_none()));
    }

    #[test]
    fn partial_archive_name_maps_to_job() {
        let id = JobId::new();
        assert_eq!(job_id_from_name(&format!("{id}.zip.partial")), Some(id));
        assert_eq!(job_id_from_name(&id.to_string()), Some(id));
    }
}
