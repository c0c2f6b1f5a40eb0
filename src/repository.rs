//! Persistence collaborator: where finished document folders are handed off.
//!
//! The pipeline only needs two things from a repository: submit a folder with
//! its metadata and get back an id. [`DirectoryRepository`] is the local
//! implementation; network-backed repositories implement [`Repository`]
//! themselves.

use crate::metadata::{Metadata, METADATA_FILE};
use crate::pipeline::originals::copy_tree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Repository-assigned document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub String);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Credentials were refused.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The repository could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The repository was reached but refused the document.
    #[error("document rejected: {0}")]
    Rejected(String),
}

/// Accepts finished document folders.
pub trait Repository: Send + Sync {
    /// Short name for logs and error messages.
    fn name(&self) -> &str;

    /// Store the folder and its metadata; returns the new document's id.
    ///
    /// The folder is only read. The caller removes it after a successful
    /// submission.
    fn submit(&self, folder: &Path, metadata: &Metadata) -> Result<DocId, RepositoryError>;
}

/// Keeps each submitted folder under `root/<id>/`.
///
/// Ids are zero-padded sequence numbers continuing from the highest id
/// already present under the root.
#[derive(Debug)]
pub struct DirectoryRepository {
    root: PathBuf,
    name: String,
    next: Mutex<Option<u64>>,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self {
            root,
            name,
            next: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding the document with `id`.
    pub fn document_folder(&self, id: &DocId) -> PathBuf {
        self.root.join(&id.0)
    }

    fn allocate(&self) -> Result<DocId, RepositoryError> {
        let mut next = self
            .next
            .lock()
            .map_err(|_| RepositoryError::Rejected("id allocator poisoned".into()))?;
        let n = match *next {
            Some(n) => n,
            None => {
                let entries = std::fs::read_dir(&self.root)
                    .map_err(|e| RepositoryError::Connection(format!("{}: {e}", self.root.display())))?;
                entries
                    .filter_map(Result::ok)
                    .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse::<u64>().ok()))
                    .max()
                    .map_or(1, |n| n + 1)
            }
        };
        *next = Some(n + 1);
        Ok(DocId(format!("{n:08}")))
    }
}

impl Repository for DirectoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, folder: &Path, metadata: &Metadata) -> Result<DocId, RepositoryError> {
        if !self.root.is_dir() {
            return Err(RepositoryError::Connection(format!(
                "repository root '{}' is not a directory",
                self.root.display()
            )));
        }
        if !folder.is_dir() {
            return Err(RepositoryError::Rejected(format!(
                "'{}' is not a document folder",
                folder.display()
            )));
        }
        let id = self.allocate()?;
        let target = self.document_folder(&id);
        debug!("copying {} to {}", folder.display(), target.display());
        copy_tree(folder, &target).map_err(|e| RepositoryError::Rejected(e.to_string()))?;
        Metadata::update_file(&target.join(METADATA_FILE), metadata)
            .map_err(|e| RepositoryError::Rejected(format!("metadata: {e}")))?;
        info!("stored document {} in {}", id, self.name);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder_with(dir: &Path, name: &str) -> PathBuf {
        let f = dir.join(name);
        std::fs::create_dir_all(f.join("page-images")).unwrap();
        std::fs::write(f.join("contents.txt"), "hello").unwrap();
        std::fs::write(f.join("page-images/page00001.png"), b"png").unwrap();
        f
    }

    #[test]
    fn submit_copies_folder_and_allocates_sequential_ids() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("00000041")).unwrap();
        let repo = DirectoryRepository::new(root.path());

        let mut md = Metadata::new();
        md.set("title", "Quarterly report");
        let a = repo.submit(&folder_with(work.path(), "a"), &md).unwrap();
        let b = repo.submit(&folder_with(work.path(), "b"), &Metadata::new()).unwrap();
        assert_eq!(a.0, "00000042");
        assert_eq!(b.0, "00000043");

        let stored = repo.document_folder(&a);
        assert!(stored.join("page-images/page00001.png").exists());
        let meta = Metadata::read(&stored.join(METADATA_FILE)).unwrap();
        assert_eq!(meta.get("title"), Some("Quarterly report"));
    }

    #[test]
    fn missing_root_is_a_connection_error() {
        let work = tempfile::tempdir().unwrap();
        let repo = DirectoryRepository::new(work.path().join("nowhere"));
        let err = repo
            .submit(&folder_with(work.path(), "a"), &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Connection(_)));
    }
}
