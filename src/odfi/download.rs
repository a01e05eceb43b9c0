//! Remote-to-local materialization of ODFI files.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::metrics::GatewayMetrics;
use crate::upload::{Agent, AgentError, FileDownload};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("problem creating {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("problem downloading {kind} files: {source}")]
    Enumerate {
        kind: &'static str,
        #[source]
        source: AgentError,
    },

    #[error("problem saving files [{filenames}]: {source}")]
    WriteFiles {
        filenames: String,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    /// Best available filename for a per-file notification.
    pub fn filename_hint(&self) -> String {
        match self {
            DownloadError::WriteFiles { filenames, .. } => filenames.clone(),
            DownloadError::Enumerate { kind, .. } => (*kind).to_string(),
            DownloadError::Setup { path, .. } => path.display().to_string(),
        }
    }
}

/// A per-poll scratch tree under the storage root. Deleted after the
/// poll unless retention is configured.
pub struct DownloadedFiles {
    pub dir: PathBuf,
}

impl DownloadedFiles {
    pub fn delete_files(&self) -> io::Result<()> {
        fs::remove_dir_all(&self.dir)
    }

    /// Best-effort removal of direction subtrees that stayed empty.
    pub fn delete_empty_dirs(&self, agent: &dyn Agent) -> io::Result<()> {
        for sub in [
            agent.inbound_path(),
            agent.reconciliation_path(),
            agent.return_path(),
        ] {
            let path = self.dir.join(sub);
            let empty = match fs::read_dir(&path) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if empty {
                fs::remove_dir_all(&path)?;
            }
        }
        Ok(())
    }

    /// Filenames materialized under one direction subtree.
    pub fn files_in(&self, sub: &str) -> io::Result<Vec<String>> {
        let path = self.dir.join(sub);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

pub struct Downloader {
    base_dir: PathBuf,
    remove_zero_byte_files: bool,
    metrics: Arc<GatewayMetrics>,
}

impl Downloader {
    pub fn new(cfg: &StorageConfig, metrics: Arc<GatewayMetrics>) -> Result<Self, DownloadError> {
        let base_dir = PathBuf::from(&cfg.directory);
        fs::create_dir_all(&base_dir).map_err(|e| DownloadError::Setup {
            path: base_dir.clone(),
            source: e,
        })?;
        Ok(Self {
            base_dir,
            remove_zero_byte_files: cfg.remove_zero_byte_files,
            metrics,
        })
    }

    /// Create a fresh `download<rand>/` scratch tree with the agent's
    /// three direction subtrees pre-created.
    pub fn setup(&self, agent: &dyn Agent) -> Result<DownloadedFiles, DownloadError> {
        let dir = loop {
            let candidate = self
                .base_dir
                .join(format!("download{:08x}", rand::random::<u32>()));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(DownloadError::Setup {
                        path: candidate,
                        source: e,
                    });
                }
            }
        };
        debug!(dir = %dir.display(), "created download directory");

        for sub in [
            agent.inbound_path(),
            agent.reconciliation_path(),
            agent.return_path(),
        ] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(|e| DownloadError::Setup { path, source: e })?;
        }

        Ok(DownloadedFiles { dir })
    }

    /// Copy down all three remote directions into the scratch tree.
    pub async fn copy_into(
        &self,
        out: &DownloadedFiles,
        agent: &dyn Agent,
    ) -> Result<(), DownloadError> {
        let files = agent
            .get_inbound_files()
            .await
            .map_err(|e| DownloadError::Enumerate {
                kind: "inbound",
                source: e,
            })?;
        info!(count = files.len(), path = agent.inbound_path(), "found inbound files");
        let kept = self.write_files(&out.dir.join(agent.inbound_path()), files)?;
        self.metrics.files_downloaded("inbound", kept);

        let files = agent
            .get_reconciliation_files()
            .await
            .map_err(|e| DownloadError::Enumerate {
                kind: "reconciliation",
                source: e,
            })?;
        info!(
            count = files.len(),
            path = agent.reconciliation_path(),
            "found reconciliation files"
        );
        let kept = self.write_files(&out.dir.join(agent.reconciliation_path()), files)?;
        self.metrics.files_downloaded("reconciliation", kept);

        let files = agent
            .get_return_files()
            .await
            .map_err(|e| DownloadError::Enumerate {
                kind: "return",
                source: e,
            })?;
        info!(count = files.len(), path = agent.return_path(), "found return files");
        let kept = self.write_files(&out.dir.join(agent.return_path()), files)?;
        self.metrics.files_downloaded("return", kept);

        Ok(())
    }

    /// Setup plus copy. On failure the scratch tree is left behind for
    /// inspection; the caller owns retry and retention.
    pub async fn copy_files_from_remote(
        &self,
        agent: &dyn Agent,
    ) -> Result<DownloadedFiles, DownloadError> {
        let out = self.setup(agent)?;
        self.copy_into(&out, agent).await?;
        Ok(out)
    }

    /// Stream each file to its local target, fsync, and close both ends.
    /// The first error is remembered and the loop continues; the combined
    /// error names every failed filename. Returns how many files were
    /// kept (zero-byte files may be filtered).
    fn write_files(&self, dir: &Path, files: Vec<FileDownload>) -> Result<u64, DownloadError> {
        let mut first_err: Option<io::Error> = None;
        let mut failed: Vec<String> = Vec::new();
        let mut kept = 0u64;

        for mut file in files {
            let target = dir.join(&file.filename);
            let result = (|| -> io::Result<u64> {
                let mut local = File::create(&target)?;
                let written = io::copy(&mut file.contents, &mut local)?;
                local.sync_all()?;
                Ok(written)
            })();
            match result {
                Ok(0) if self.remove_zero_byte_files => {
                    let _ = fs::remove_file(&target);
                    debug!(filename = %file.filename, "skipping zero-byte file");
                }
                Ok(_) => {
                    kept += 1;
                    debug!(filename = %file.filename, target = %target.display(), "saved file");
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                    failed.push(file.filename.clone());
                }
            }
        }

        if let Some(source) = first_err {
            return Err(DownloadError::WriteFiles {
                filenames: failed.join(", "),
                source,
            });
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentPathsConfig;
    use crate::upload::MockAgent;
    use prometheus::Registry;

    fn downloader(dir: &Path, remove_zero_byte: bool) -> (Downloader, Registry) {
        let registry = Registry::new();
        let metrics = Arc::new(GatewayMetrics::new(&registry).unwrap());
        let cfg = StorageConfig {
            directory: dir.display().to_string(),
            remove_zero_byte_files: remove_zero_byte,
            ..StorageConfig::default()
        };
        (Downloader::new(&cfg, metrics).unwrap(), registry)
    }

    #[tokio::test]
    async fn test_download_materializes_remote_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, registry) = downloader(tmp.path(), false);

        let agent = MockAgent::new(AgentPathsConfig::default());
        agent.add_file("inbound", "iat-credit.ach", b"123456789");

        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        let local = out.dir.join("inbound/iat-credit.ach");
        assert_eq!(fs::read(&local).unwrap(), b"123456789");

        let text = GatewayMetrics::export(&registry).unwrap();
        assert!(text.contains("files_downloaded{kind=\"inbound\"} 1"));
    }

    #[tokio::test]
    async fn test_zero_byte_files_filtered_when_configured() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, registry) = downloader(tmp.path(), true);

        let agent = MockAgent::new(AgentPathsConfig::default());
        agent.add_file("inbound", "empty.ach", b"");
        agent.add_file("inbound", "real.ach", b"data");

        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        assert!(!out.dir.join("inbound/empty.ach").exists());
        assert!(out.dir.join("inbound/real.ach").exists());

        let text = GatewayMetrics::export(&registry).unwrap();
        assert!(text.contains("files_downloaded{kind=\"inbound\"} 1"));
    }

    #[tokio::test]
    async fn test_zero_byte_files_kept_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, _registry) = downloader(tmp.path(), false);

        let agent = MockAgent::new(AgentPathsConfig::default());
        agent.add_file("inbound", "empty.ach", b"");

        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        assert!(out.dir.join("inbound/empty.ach").exists());
    }

    #[tokio::test]
    async fn test_delete_empty_dirs_removes_unused_subtrees() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, _registry) = downloader(tmp.path(), false);

        let agent = MockAgent::new(AgentPathsConfig::default());
        agent.add_file("inbound", "a.ach", b"data");

        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        out.delete_empty_dirs(&agent).unwrap();

        assert!(out.dir.join("inbound").exists());
        assert!(!out.dir.join("reconciliation").exists());
        assert!(!out.dir.join("return").exists());
    }

    #[tokio::test]
    async fn test_delete_files_removes_scratch_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, _registry) = downloader(tmp.path(), false);

        let agent = MockAgent::new(AgentPathsConfig::default());
        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        assert!(out.dir.exists());
        out.delete_files().unwrap();
        assert!(!out.dir.exists());
    }

    #[tokio::test]
    async fn test_files_in_lists_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, _registry) = downloader(tmp.path(), false);

        let agent = MockAgent::new(AgentPathsConfig::default());
        agent.add_file("return", "b.ach", b"b");
        agent.add_file("return", "a.ach", b"a");

        let out = downloader.copy_files_from_remote(&agent).await.unwrap();
        assert_eq!(out.files_in("return").unwrap(), vec!["a.ach", "b.ach"]);
        assert!(out.files_in("inbound").unwrap().is_empty());
    }
}
