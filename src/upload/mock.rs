//! In-memory transport for tests and dry runs.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Agent, AgentError, FileDownload};
use crate::config::AgentPathsConfig;

/// Records uploads and deletions, serves seeded remote files.
pub struct MockAgent {
    paths: AgentPathsConfig,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    uploaded: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_uploads: Mutex<bool>,
}

impl MockAgent {
    pub fn new(paths: AgentPathsConfig) -> Self {
        Self {
            paths,
            files: Mutex::new(BTreeMap::new()),
            uploaded: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_uploads: Mutex::new(false),
        }
    }

    /// Seed a remote file, keyed by `dir/filename`.
    pub fn add_file(&self, dir: &str, filename: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(format!("{}/{}", dir, filename), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Filenames passed to `upload_file`, in call order.
    pub fn uploaded_files(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock().unwrap() = fail;
    }

    fn list_dir(&self, dir: &str) -> Vec<FileDownload> {
        let prefix = format!("{}/", dir);
        self.files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, contents)| FileDownload {
                filename: path[prefix.len()..].to_string(),
                contents: Box::new(Cursor::new(contents.clone())),
            })
            .collect()
    }
}

#[async_trait]
impl Agent for MockAgent {
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
        Ok(self.list_dir(&self.paths.inbound))
    }

    async fn get_return_files(&self) -> Result<Vec<FileDownload>, AgentError> {
        Ok(self.list_dir(&self.paths.return_))
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<FileDownload>, AgentError> {
        Ok(self.list_dir(&self.paths.reconciliation))
    }

    async fn upload_file(&self, filename: &str, contents: &[u8]) -> Result<(), AgentError> {
        if *self.fail_uploads.lock().unwrap() {
            return Err(AgentError::Unavailable("mock upload failure".to_string()));
        }
        self.files.lock().unwrap().insert(
            format!("{}/{}", self.paths.outbound, filename),
            contents.to_vec(),
        );
        self.uploaded.lock().unwrap().push(filename.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), AgentError> {
        self.files.lock().unwrap().remove(path);
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AgentError> {
        Ok(())
    }

    fn hostname(&self) -> String {
        "mock".to_string()
    }
}
