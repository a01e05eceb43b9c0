//! Remote file transfer agents.
//!
//! An [`Agent`] is the abstract remote surface the pipeline uploads merged
//! files to and the inbound poller downloads from. The core never branches
//! on transport type; SFTP/FTP clients plug in behind the same trait.

pub mod filesystem;
pub mod mock;

pub use filesystem::FilesystemAgent;
pub use mock::MockAgent;

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::UploadAgentConfig;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent session unavailable: {0}")]
    Unavailable(String),
}

/// A remote file, enumerated from one of the agent's directories.
///
/// The caller owns the stream; dropping it releases the source.
pub struct FileDownload {
    pub filename: String,
    pub contents: Box<dyn Read + Send>,
}

/// Capability set of a remote transfer agent.
#[async_trait]
pub trait Agent: Send + Sync {
    fn inbound_path(&self) -> &str;
    fn outbound_path(&self) -> &str;
    fn reconciliation_path(&self) -> &str;
    fn return_path(&self) -> &str;

    /// Enumerate and fetch the inbound directory. Subdirectories are
    /// skipped, not errors.
    async fn get_inbound_files(&self) -> Result<Vec<FileDownload>, AgentError>;
    async fn get_return_files(&self) -> Result<Vec<FileDownload>, AgentError>;
    async fn get_reconciliation_files(&self) -> Result<Vec<FileDownload>, AgentError>;

    /// Write `contents` under the outbound path, creating missing parent
    /// directories. No partial file is observable at the final name on
    /// failure.
    async fn upload_file(&self, filename: &str, contents: &[u8]) -> Result<(), AgentError>;

    /// Idempotent: deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<(), AgentError>;

    /// Liveness probe; fails if a session cannot be established.
    async fn ping(&self) -> Result<(), AgentError>;

    /// Release session resources.
    async fn close(&self) -> Result<(), AgentError>;

    /// Observational only, used for logging and notifications.
    fn hostname(&self) -> String;
}

/// Build an agent from a shard's transport profile.
pub fn new_agent(cfg: &UploadAgentConfig) -> Result<Arc<dyn Agent>, AgentError> {
    if let Some(fs) = &cfg.filesystem {
        return Ok(Arc::new(FilesystemAgent::new(&fs.root, cfg.paths.clone())));
    }
    if cfg.mock {
        return Ok(Arc::new(MockAgent::new(cfg.paths.clone())));
    }
    Err(AgentError::Unavailable(format!(
        "upload agent '{}' has no transport configured",
        cfg.id
    )))
}
