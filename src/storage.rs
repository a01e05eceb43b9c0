//! Durable staging store.
//!
//! A [`FilesystemStore`] is rooted at one directory; all paths are
//! relative to it. `replace_dir` relies on rename(2) atomicity, which is
//! the mutual-exclusion primitive between cutoffs on a single host: of
//! two concurrent renames of the same source, exactly one succeeds.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path escapes storage root: {0}")]
    PathEscape(PathBuf),

    #[error("unsupported glob pattern: {0}")]
    BadPattern(String),
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path under the root, rejecting traversal.
    fn full(&self, rel: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        let rel = rel.as_ref();
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(StorageError::PathEscape(rel.to_path_buf()));
        }
        Ok(self.root.join(rel))
    }

    /// Write `contents` to `rel`, creating parent directories and
    /// syncing before returning.
    pub fn write(&self, rel: impl AsRef<Path>, contents: &[u8]) -> Result<(), StorageError> {
        let path = self.full(&rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let mut file = File::create(&path).map_err(|e| StorageError::io(&path, e))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    /// Atomically rename `src` to `dst`. A missing `src` yields an empty
    /// file at `dst`, so a cancellation can land before its transfer.
    pub fn replace(
        &self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
    ) -> Result<(), StorageError> {
        let src = self.full(&src)?;
        let dst = self.full(&dst)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        if src.exists() {
            fs::rename(&src, &dst).map_err(|e| StorageError::io(&src, e))?;
        } else {
            OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&dst)
                .map_err(|e| StorageError::io(&dst, e))?;
        }
        Ok(())
    }

    /// Atomically rename the directory `src` to `dst`.
    ///
    /// Fails when `src` is missing or when `dst` already exists, so of
    /// two concurrent callers exactly one wins.
    pub fn replace_dir(
        &self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
    ) -> Result<(), StorageError> {
        let src = self.full(&src)?;
        let dst = self.full(&dst)?;
        if dst.exists() {
            return Err(StorageError::io(
                &dst,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists"),
            ));
        }
        fs::rename(&src, &dst).map_err(|e| StorageError::io(&src, e))
    }

    /// Relative paths of the direct children of a directory matching a
    /// `dir/*suffix` pattern, lexically sorted.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let (dir, suffix) = pattern
            .rsplit_once("/*")
            .ok_or_else(|| StorageError::BadPattern(pattern.to_string()))?;
        let full_dir = self.full(dir)?;

        let entries = match fs::read_dir(&full_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&full_dir, e)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&full_dir, e))?;
            if entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(suffix) {
                out.push(format!("{}/{}", dir, name));
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn open(&self, rel: impl AsRef<Path>) -> Result<File, StorageError> {
        let path = self.full(&rel)?;
        File::open(&path).map_err(|e| StorageError::io(&path, e))
    }

    pub fn mkdir_all(&self, rel: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = self.full(&rel)?;
        fs::create_dir_all(&path).map_err(|e| StorageError::io(&path, e))
    }

    pub fn rmdir_all(&self, rel: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = self.full(&rel)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn store() -> (tempfile::TempDir, FilesystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_write_creates_parents_and_open_reads_back() {
        let (_dir, store) = store();
        store.write("mergable/sbx/AAA.ach", b"hello").unwrap();

        let mut contents = String::new();
        store
            .open("mergable/sbx/AAA.ach")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn test_path_escape_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.write("../evil", b"x"),
            Err(StorageError::PathEscape(_))
        ));
        assert!(matches!(
            store.open("/etc/passwd"),
            Err(StorageError::PathEscape(_))
        ));
    }

    #[test]
    fn test_glob_sorted_and_suffix_matched() {
        let (_dir, store) = store();
        store.write("mergable/sbx/BBB.ach", b"b").unwrap();
        store.write("mergable/sbx/AAA.ach", b"a").unwrap();
        store.write("mergable/sbx/AAA.ach.canceled", b"").unwrap();
        store.write("mergable/sbx/AAA.json", b"{}").unwrap();
        store.mkdir_all("mergable/sbx/subdir").unwrap();

        let matches = store.glob("mergable/sbx/*.ach").unwrap();
        assert_eq!(
            matches,
            vec!["mergable/sbx/AAA.ach", "mergable/sbx/BBB.ach"]
        );

        let canceled = store.glob("mergable/sbx/*.canceled").unwrap();
        assert_eq!(canceled, vec!["mergable/sbx/AAA.ach.canceled"]);
    }

    #[test]
    fn test_glob_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.glob("mergable/none/*.ach").unwrap().is_empty());
    }

    #[test]
    fn test_replace_renames_existing_file() {
        let (_dir, store) = store();
        store.write("mergable/sbx/AAA.ach", b"data").unwrap();
        store
            .replace("mergable/sbx/AAA.ach", "mergable/sbx/AAA.ach.canceled")
            .unwrap();

        assert!(store.glob("mergable/sbx/*.ach").unwrap().is_empty());
        assert_eq!(
            store.glob("mergable/sbx/*.canceled").unwrap(),
            vec!["mergable/sbx/AAA.ach.canceled"]
        );
    }

    #[test]
    fn test_replace_missing_src_creates_empty_dst() {
        let (_dir, store) = store();
        store
            .replace("mergable/sbx/AAA.ach", "mergable/sbx/AAA.ach.canceled")
            .unwrap();

        let mut contents = Vec::new();
        store
            .open("mergable/sbx/AAA.ach.canceled")
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn test_replace_dir_single_winner() {
        let (_dir, store) = store();
        store.write("mergable/sbx/AAA.ach", b"data").unwrap();

        store.replace_dir("mergable/sbx", "sbx-20240101-120000").unwrap();
        // second isolation of the same source fails cleanly
        assert!(store.replace_dir("mergable/sbx", "sbx-20240101-120001").is_err());

        assert_eq!(
            store.glob("sbx-20240101-120000/*.ach").unwrap(),
            vec!["sbx-20240101-120000/AAA.ach"]
        );
    }

    #[test]
    fn test_rmdir_all_is_idempotent() {
        let (_dir, store) = store();
        store.write("gone/AAA.ach", b"x").unwrap();
        store.rmdir_all("gone").unwrap();
        store.rmdir_all("gone").unwrap();
    }
}
