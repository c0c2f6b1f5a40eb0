//! `CopyOriginal` and `Fingerprint`: keep the source bytes with the document
//! and hash them.

use super::ORIGINALS_DIR;
use crate::error::StageError;
use crate::registry::SourceKind;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Recursively copy `src` into `dst`, creating `dst`. Entries are visited in
/// name order.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in sorted_entries(src)? {
        let name = entry.file_name().unwrap_or_default();
        let target = dst.join(name);
        if entry.is_dir() {
            copy_tree(&entry, &target)?;
        } else {
            std::fs::copy(&entry, &target)?;
        }
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<std::path::PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Copy the source into `folder/originals/`.
///
/// A file keeps its name; a directory input keeps its structure. A prepared
/// folder already has an `originals/` of its own, which is carried over.
pub fn copy_original(source: &Path, folder: &Path, kind: SourceKind) -> Result<(), StageError> {
    let originals = folder.join(ORIGINALS_DIR);

    if kind == SourceKind::Prepared {
        let prepared = source.join(ORIGINALS_DIR);
        if prepared.is_dir() {
            copy_tree(&prepared, &originals).map_err(|e| StageError::io(&prepared, e))?;
        }
        return Ok(());
    }

    std::fs::create_dir_all(&originals).map_err(|e| StageError::io(&originals, e))?;
    let name = source
        .file_name()
        .ok_or_else(|| StageError::Malformed(format!("'{}' has no file name", source.display())))?;
    let target = originals.join(name);
    if source.is_dir() {
        copy_tree(source, &target).map_err(|e| StageError::io(source, e))?;
    } else {
        std::fs::copy(source, &target).map_err(|e| StageError::io(source, e))?;
    }
    debug!("copied {} to {}", source.display(), target.display());
    Ok(())
}

/// SHA-256 over the contents of every file under `dir`, walked in sorted
/// order. Names do not contribute, only bytes.
pub fn fingerprint_tree(dir: &Path) -> Result<String, StageError> {
    let mut hasher = Sha256::new();
    hash_into(dir, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn hash_into(dir: &Path, hasher: &mut Sha256) -> Result<(), StageError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in sorted_entries(dir).map_err(|e| StageError::io(dir, e))? {
        if entry.is_dir() {
            hash_into(&entry, hasher)?;
        } else {
            let mut f = File::open(&entry).map_err(|e| StageError::io(&entry, e))?;
            io::copy(&mut f, hasher).map_err(|e| StageError::io(&entry, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_inputs_keep_their_structure() {
        let src = tempfile::tempdir().unwrap();
        let bundle = src.path().join("bundle");
        std::fs::create_dir_all(bundle.join("parts")).unwrap();
        std::fs::write(bundle.join("index.html"), "<html>").unwrap();
        std::fs::write(bundle.join("parts/a.png"), "png").unwrap();

        let folder = tempfile::tempdir().unwrap();
        copy_original(&bundle, folder.path(), SourceKind::ConvertedPdf).unwrap();
        assert!(folder.path().join("originals/bundle/parts/a.png").exists());
        assert!(folder.path().join("originals/bundle/index.html").exists());
    }

    #[test]
    fn fingerprint_depends_on_bytes_and_order_only() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        std::fs::write(a.path().join("1"), "alpha").unwrap();
        std::fs::write(a.path().join("2"), "beta").unwrap();
        std::fs::write(b.path().join("x"), "alpha").unwrap();
        std::fs::write(b.path().join("y"), "beta").unwrap();
        let fa = fingerprint_tree(a.path()).unwrap();
        assert_eq!(fa, fingerprint_tree(b.path()).unwrap());
        assert_eq!(fa.len(), 64);

        std::fs::write(b.path().join("y"), "gamma").unwrap();
        assert_ne!(fa, fingerprint_tree(b.path()).unwrap());
    }
}
