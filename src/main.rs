use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ach_gateway::config::AppConfig;
use ach_gateway::lease::MemoryLeases;
use ach_gateway::logging;
use ach_gateway::metrics::GatewayMetrics;
use ach_gateway::notify::MultiSender;
use ach_gateway::odfi::{DownloadedFiles, Downloader, InboundProcessor, OdfiWorker};
use ach_gateway::pipeline::{CutoffWorker, ShardMerging};
use ach_gateway::storage::FilesystemStore;

/// Default downstream handler: log the scratch tree and leave the files
/// for whatever consumes the storage directory.
struct LoggingProcessor;

#[async_trait::async_trait]
impl InboundProcessor for LoggingProcessor {
    async fn process(&self, shard: &str, downloaded: &DownloadedFiles) -> anyhow::Result<()> {
        info!(shard = %shard, dir = %downloaded.dir.display(), "downloaded odfi files");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("ACHGW_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let _guard = logging::init_logging(&config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "starting ach-gateway"
    );

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(GatewayMetrics::new(&registry)?);
    let notifier = MultiSender::from_config(&config.notifications);

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let leases = MemoryLeases::new(config.lease.ttl());
    let lease_client = Arc::new(leases.client(hostname));

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    for shard in &config.shards {
        let agent_cfg = config
            .upload_agent(&shard.upload_agent)
            .expect("validated at startup")
            .clone();
        let store = FilesystemStore::new(&config.storage.directory)?;
        let merging = Arc::new(ShardMerging::new(
            shard.clone(),
            store,
            lease_client.clone(),
        ));

        let (worker, _trigger) = CutoffWorker::new(
            merging,
            agent_cfg,
            notifier.clone(),
            Arc::clone(&metrics),
            config.pipeline.cutoff_interval(),
            cancel.child_token(),
        );
        tasks.push(tokio::spawn(worker.run()));
    }

    if let Some(odfi) = &config.odfi {
        let mut shards = Vec::new();
        for name in &odfi.shard_names {
            let shard = config.shard(name).expect("validated at startup");
            let agent_cfg = config
                .upload_agent(&shard.upload_agent)
                .expect("validated at startup")
                .clone();
            shards.push((name.clone(), agent_cfg));
        }

        let downloader = Downloader::new(&config.storage, Arc::clone(&metrics))?;
        let worker = OdfiWorker::new(
            shards,
            config.storage.clone(),
            downloader,
            Arc::new(LoggingProcessor),
            notifier.clone(),
            odfi.interval(),
            cancel.child_token(),
        );
        tasks.push(tokio::spawn(worker.run()));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "worker task panicked");
        }
    }

    Ok(())
}
