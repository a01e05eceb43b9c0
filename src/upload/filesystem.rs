//! Local directory tree transport.
//!
//! Useful for development and for exchanges mounted onto the local
//! filesystem. The four logical directories live under one root.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Agent, AgentError, FileDownload};
use crate::config::AgentPathsConfig;

pub struct FilesystemAgent {
    root: PathBuf,
    paths: AgentPathsConfig,
}

impl FilesystemAgent {
    pub fn new(root: impl Into<PathBuf>, paths: AgentPathsConfig) -> Self {
        Self {
            root: root.into(),
            paths,
        }
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<FileDownload>, AgentError> {
        let path = self.root.join(dir);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path, e)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&path, e))?;
            if entry.path().is_dir() {
                continue;
            }
            let Some(filename) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let file = File::open(entry.path()).map_err(|e| io_err(&entry.path(), e))?;
            out.push(FileDownload {
                filename,
                contents: Box::new(file),
            });
        }
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }
}

#[async_trait]
impl Agent for FilesystemAgent {
    fn inbound_path(&self) -> &str {
        &self.paths.inbound
    }

    fn outbound_path(&self) -> &str {
        &self.paths.outbound
    }

    fn reconciliation_path(&self) -> &str {
        &self.paths.reconciliation
    }

    fn return_path(&self) -> &str {
        &self.paths.return_
    }

    async fn get_inbound_files(&self) -> Result<Vec<FileDownload>, AgentError> {
        self.list_dir(&self.paths.inbound)
    }

    async fn get_return_files(&self) -> Result<Vec<FileDownload>, AgentError> {
        self.list_dir(&self.paths.return_)
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<FileDownload>, AgentError> {
        self.list_dir(&self.paths.reconciliation)
    }

    async fn upload_file(&self, filename: &str, contents: &[u8]) -> Result<(), AgentError> {
        let target = self.root.join(&self.paths.outbound).join(filename);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        // write to a temp sibling, then rename into place
        let tmp = target.with_extension("part");
        let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| io_err(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &target).map_err(|e| io_err(&target, e))
    }

    async fn delete(&self, path: &str) -> Result<(), AgentError> {
        let target = self.root.join(path);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&target, e)),
        }
    }

    async fn ping(&self) -> Result<(), AgentError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(AgentError::Unavailable(format!(
                "root {} is not a directory",
                self.root.display()
            )))
        }
    }

    async fn close(&self) -> Result<(), AgentError> {
        Ok(())
    }

    fn hostname(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

fn io_err(path: &Path, source: std::io::Error) -> AgentError {
    AgentError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn agent() -> (tempfile::TempDir, FilesystemAgent) {
        let dir = tempfile::tempdir().unwrap();
        let agent = FilesystemAgent::new(dir.path(), AgentPathsConfig::default());
        (dir, agent)
    }

    #[tokio::test]
    async fn test_upload_then_list_outbound() {
        let (dir, agent) = agent();
        agent.upload_file("merged.ach", b"contents").await.unwrap();

        let uploaded = dir.path().join("outbound/merged.ach");
        assert_eq!(fs::read(uploaded).unwrap(), b"contents");
        // no temp file left behind
        assert!(!dir.path().join("outbound/merged.part").exists());
    }

    #[tokio::test]
    async fn test_inbound_enumeration_skips_subdirectories() {
        let (dir, agent) = agent();
        fs::create_dir_all(dir.path().join("inbound/archive")).unwrap();
        fs::write(dir.path().join("inbound/iat-credit.ach"), b"123456789").unwrap();

        let files = agent.get_inbound_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "iat-credit.ach");
    }

    #[tokio::test]
    async fn test_inbound_streams_content() {
        let (dir, agent) = agent();
        fs::create_dir_all(dir.path().join("inbound")).unwrap();
        fs::write(dir.path().join("inbound/a.ach"), b"payload").unwrap();

        let mut files = agent.get_inbound_files().await.unwrap();
        let mut buf = Vec::new();
        files[0].contents.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"payload");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, agent) = agent();
        agent.delete("inbound/missing.ach").await.unwrap();
    }

    #[tokio::test]
    async fn test_ping() {
        let (dir, agent) = agent();
        agent.ping().await.unwrap();
        drop(agent);

        let gone = FilesystemAgent::new(
            dir.path().join("nope"),
            AgentPathsConfig::default(),
        );
        assert!(gone.ping().await.is_err());
    }
}
