//! Inbound polling loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::download::{DownloadedFiles, Downloader};
use crate::config::{StorageConfig, UploadAgentConfig};
use crate::notify::{Direction, Message, MultiSender};
use crate::upload::{self, Agent};

/// Downstream handler for a completed poll's scratch tree.
#[async_trait]
pub trait InboundProcessor: Send + Sync {
    async fn process(&self, shard: &str, downloaded: &DownloadedFiles) -> anyhow::Result<()>;
}

/// Polls the ODFI's server for every configured shard on an interval.
pub struct OdfiWorker {
    shards: Vec<(String, UploadAgentConfig)>,
    storage: StorageConfig,
    downloader: Downloader,
    processor: Arc<dyn InboundProcessor>,
    notifier: MultiSender,
    interval: Duration,
    cancel: CancellationToken,
}

impl OdfiWorker {
    pub fn new(
        shards: Vec<(String, UploadAgentConfig)>,
        storage: StorageConfig,
        downloader: Downloader,
        processor: Arc<dyn InboundProcessor>,
        notifier: MultiSender,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shards,
            storage,
            downloader,
            processor,
            notifier,
            interval,
            cancel,
        }
    }

    pub async fn run(self) {
        info!(
            shards = self.shards.len(),
            interval_secs = self.interval.as_secs(),
            "starting odfi worker"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("odfi worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    for (shard, agent_cfg) in &self.shards {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        self.poll_shard(shard, agent_cfg).await;
                    }
                }
            }
        }
    }

    /// One poll cycle for one shard: download, hand off, clean up.
    pub async fn poll_shard(&self, shard: &str, agent_cfg: &UploadAgentConfig) {
        let agent = match upload::new_agent(agent_cfg) {
            Ok(agent) => agent,
            Err(e) => {
                error!(shard = %shard, error = %e, "unable to build odfi agent");
                return;
            }
        };

        let out = match self.downloader.setup(agent.as_ref()) {
            Ok(out) => out,
            Err(e) => {
                error!(shard = %shard, error = %e, "unable to create download directory");
                return;
            }
        };

        match self.downloader.copy_into(&out, agent.as_ref()).await {
            Ok(()) => {
                self.notify_downloads(&out, agent.as_ref()).await;

                if let Err(e) = self.processor.process(shard, &out).await {
                    error!(shard = %shard, error = %e, "problem processing downloaded files");
                } else if !self.storage.keep_remote_files {
                    self.delete_remote_files(&out, agent.as_ref()).await;
                }
            }
            Err(e) => {
                error!(shard = %shard, error = %e, "problem downloading files");
                self.notifier
                    .critical(&Message {
                        direction: Direction::Download,
                        filename: e.filename_hint(),
                        hostname: agent.hostname(),
                        error: Some(e.to_string()),
                    })
                    .await;
            }
        }

        if let Err(e) = out.delete_empty_dirs(agent.as_ref()) {
            warn!(shard = %shard, error = %e, "problem deleting empty directories");
        }
        if self.storage.cleanup_local_directory
            && let Err(e) = out.delete_files()
        {
            warn!(shard = %shard, error = %e, "problem cleaning up download directory");
        }
        if let Err(e) = agent.close().await {
            warn!(shard = %shard, error = %e, "problem closing agent");
        }
    }

    /// One info notification per materialized file.
    async fn notify_downloads(&self, out: &DownloadedFiles, agent: &dyn Agent) {
        for sub in [
            agent.inbound_path(),
            agent.reconciliation_path(),
            agent.return_path(),
        ] {
            let Ok(files) = out.files_in(sub) else { continue };
            for filename in files {
                self.notifier
                    .info(&Message {
                        direction: Direction::Download,
                        filename,
                        hostname: agent.hostname(),
                        error: None,
                    })
                    .await;
            }
        }
    }

    /// Delete the remote originals of everything we materialized.
    async fn delete_remote_files(&self, out: &DownloadedFiles, agent: &dyn Agent) {
        for sub in [
            agent.inbound_path(),
            agent.reconciliation_path(),
            agent.return_path(),
        ] {
            let Ok(files) = out.files_in(sub) else { continue };
            for filename in files {
                let remote = format!("{}/{}", sub, filename);
                if let Err(e) = agent.delete(&remote).await {
                    warn!(path = %remote, error = %e, "problem deleting remote file");
                }
            }
        }
    }
}
