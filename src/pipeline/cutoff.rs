//! Cutoff driver.
//!
//! One worker per shard owns its transfer agent for the duration of a
//! cycle and drives [`ShardMerging::with_each_merged`] on an interval
//! tick or an external trigger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::merging::{MergedUploader, ShardMerging};
use super::sha256_hex;
use crate::config::UploadAgentConfig;
use crate::metrics::GatewayMetrics;
use crate::nacha::{self, NachaFile};
use crate::notify::{Direction, Message, MultiSender};
use crate::upload::{self, Agent};

/// Requests an out-of-schedule cutoff, e.g. from an admin endpoint.
#[derive(Clone)]
pub struct CutoffTrigger {
    tx: mpsc::Sender<()>,
}

impl CutoffTrigger {
    pub async fn trigger(&self) {
        let _ = self.tx.send(()).await;
    }
}

pub struct CutoffWorker {
    merging: Arc<ShardMerging>,
    agent_cfg: UploadAgentConfig,
    notifier: MultiSender,
    metrics: Arc<GatewayMetrics>,
    interval: Duration,
    cancel: CancellationToken,
    trigger_rx: mpsc::Receiver<()>,
}

impl CutoffWorker {
    pub fn new(
        merging: Arc<ShardMerging>,
        agent_cfg: UploadAgentConfig,
        notifier: MultiSender,
        metrics: Arc<GatewayMetrics>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, CutoffTrigger) {
        let (tx, trigger_rx) = mpsc::channel(1);
        (
            Self {
                merging,
                agent_cfg,
                notifier,
                metrics,
                interval,
                cancel,
                trigger_rx,
            },
            CutoffTrigger { tx },
        )
    }

    pub async fn run(mut self) {
        info!(
            shard = %self.merging.shard_name(),
            interval_secs = self.interval.as_secs(),
            "starting cutoff worker"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(shard = %self.merging.shard_name(), "cutoff worker stopping");
                    break;
                }
                _ = ticker.tick() => self.process().await,
                Some(()) = self.trigger_rx.recv() => self.process().await,
            }
        }
    }

    /// Run one cutoff for this shard.
    pub async fn process(&self) {
        let shard = self.merging.shard_name().to_string();
        let agent = match upload::new_agent(&self.agent_cfg) {
            Ok(agent) => agent,
            Err(e) => {
                error!(shard = %shard, error = %e, "unable to build upload agent");
                return;
            }
        };

        let uploader = RemoteUploader::new(
            shard.clone(),
            self.notifier.clone(),
            Arc::clone(&self.metrics),
        );

        match self
            .merging
            .with_each_merged(agent.as_ref(), &uploader, &self.cancel)
            .await
        {
            Ok(processed) => {
                if !processed.file_ids.is_empty() {
                    info!(
                        shard = %shard,
                        file_ids = ?processed.file_ids,
                        remote_writes = processed.successful_remote_writes,
                        "cutoff processed files"
                    );
                }
            }
            Err(el) => {
                self.metrics.merge_error(&shard);
                error!(shard = %shard, errors = %el, "cutoff returned errors");
            }
        }

        if let Err(e) = agent.close().await {
            error!(shard = %shard, error = %e, "problem closing agent");
        }
    }
}

/// Uploads each merged file under its content-hash name, emitting one
/// notification per file.
pub struct RemoteUploader {
    shard: String,
    notifier: MultiSender,
    metrics: Arc<GatewayMetrics>,
}

impl RemoteUploader {
    pub fn new(shard: String, notifier: MultiSender, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            shard,
            notifier,
            metrics,
        }
    }
}

#[async_trait]
impl MergedUploader for RemoteUploader {
    async fn upload(
        &self,
        _index: usize,
        agent: &dyn Agent,
        file: &NachaFile,
    ) -> anyhow::Result<()> {
        let text = nacha::write_file(file)?;
        let filename = format!("{}.ach", sha256_hex(text.as_bytes()));

        match agent.upload_file(&filename, text.as_bytes()).await {
            Ok(()) => {
                self.metrics.file_uploaded(&self.shard);
                self.notifier
                    .info(&Message {
                        direction: Direction::Upload,
                        filename,
                        hostname: agent.hostname(),
                        error: None,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .critical(&Message {
                        direction: Direction::Upload,
                        filename,
                        hostname: agent.hostname(),
                        error: Some(e.to_string()),
                    })
                    .await;
                Err(e.into())
            }
        }
    }
}
