//! Per-shard staging and the cutoff merge procedure.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ErrorList, sha256_hex};
use crate::config::ShardConfig;
use crate::incoming::{AchFile, CancelAchFile};
use crate::lease::LeaseService;
use crate::nacha::{
    self, NachaFile, ValidateOpts, flatten_batches, merge_files, merge_files_with,
};
use crate::storage::FilesystemStore;
use crate::upload::Agent;

/// Summary of one cutoff: every transfer that left the pending set,
/// including cancelled ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFiles {
    pub shard_key: String,
    /// Base names (without `.ach`) of the pending files in the batch
    pub file_ids: Vec<String>,
    pub successful_remote_writes: usize,
}

impl ProcessedFiles {
    fn empty(shard_key: &str) -> Self {
        Self {
            shard_key: shard_key.to_string(),
            file_ids: Vec::new(),
            successful_remote_writes: 0,
        }
    }
}

/// The upload step invoked for each merged file, fenced by the lease.
#[async_trait]
pub trait MergedUploader: Send + Sync {
    async fn upload(
        &self,
        index: usize,
        agent: &dyn Agent,
        file: &NachaFile,
    ) -> anyhow::Result<()>;
}

/// Accepts ACH transfers for one shard and merges them at cutoffs.
///
/// Pending transfers live under `mergable/<shard>/` in the staging store.
/// Isolation is an atomic directory rename, so many `handle_xfer` callers
/// and one in-flight cutoff never need an in-process lock.
pub struct ShardMerging {
    shard: ShardConfig,
    store: FilesystemStore,
    leases: Arc<dyn LeaseService>,
}

impl ShardMerging {
    pub fn new(shard: ShardConfig, store: FilesystemStore, leases: Arc<dyn LeaseService>) -> Self {
        Self {
            shard,
            store,
            leases,
        }
    }

    pub fn shard_name(&self) -> &str {
        &self.shard.name
    }

    fn pending_path(&self, file_id: &str) -> String {
        format!("mergable/{}/{}.ach", self.shard.name, file_id)
    }

    /// Persist a transfer into the shard's pending set.
    pub fn handle_xfer(&self, xfer: &AchFile) -> anyhow::Result<()> {
        self.write_ach_file(xfer)
            .map_err(|e| e.context(format!("problem writing ACH file {}", xfer.file_id)))
    }

    fn write_ach_file(&self, xfer: &AchFile) -> anyhow::Result<()> {
        let text = nacha::write_file(&xfer.file)?;
        self.store.write(self.pending_path(&xfer.file_id), text.as_bytes())?;

        // ValidateOpts ride along in a JSON sidecar; losing them is not
        // worth failing the transfer over
        if let Some(opts) = &xfer.validate_opts {
            let sidecar = format!("mergable/{}/{}.json", self.shard.name, xfer.file_id);
            match serde_json::to_vec(opts) {
                Ok(bytes) => {
                    if let Err(e) = self.store.write(&sidecar, &bytes) {
                        warn!(
                            file_id = %xfer.file_id,
                            shard_key = %xfer.shard_key,
                            error = %e,
                            "ERROR writing ValidateOpts"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        file_id = %xfer.file_id,
                        shard_key = %xfer.shard_key,
                        error = %e,
                        "ERROR encoding ValidateOpts"
                    );
                }
            }
        }
        Ok(())
    }

    /// Tombstone a pending transfer. The tombstone lands alongside the
    /// pending file (or alone, if the transfer never arrived) and is
    /// honored at the next cutoff.
    pub fn handle_cancel(&self, cancel: &CancelAchFile) -> anyhow::Result<()> {
        let path = format!("{}.canceled", self.pending_path(&cancel.file_id));
        self.store.write(&path, b"").map_err(|e| {
            anyhow::Error::new(e)
                .context(format!("problem writing tombstone for {}", cancel.file_id))
        })
    }

    /// Move the pending directory aside so it is isolated from concurrent
    /// ingress and easier to audit later.
    fn isolate_mergable_dir(&self) -> Result<String, crate::storage::StorageError> {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let newdir = format!("{}-{}", self.shard.name, timestamp);
        self.store
            .replace_dir(format!("mergable/{}", self.shard.name), &newdir)?;
        Ok(newdir)
    }

    /// A positive `P.ach` is selected iff no `*.canceled` name starts
    /// with it.
    fn non_canceled_matches(
        &self,
        positives: &[String],
        negatives: &[String],
    ) -> Vec<String> {
        positives
            .iter()
            .filter(|p| !negatives.iter().any(|n| n.starts_with(p.as_str())))
            .cloned()
            .collect()
    }

    fn read_file(&self, path: &str) -> anyhow::Result<NachaFile> {
        let opts = self.read_validate_opts(path);
        let file = self.store.open(path)?;
        Ok(nacha::read_file(file, opts.as_ref())?)
    }

    fn read_validate_opts(&self, path: &str) -> Option<ValidateOpts> {
        let sidecar = format!("{}.json", path.strip_suffix(".ach")?);
        let file = self.store.open(&sidecar).ok()?;
        serde_json::from_reader(file).ok()
    }

    /// Run one cutoff: isolate the pending set, merge it, and offer each
    /// merged file to `uploader` while holding the shard's outbound lease.
    ///
    /// A failed isolation means another cutoff is in flight or there is
    /// nothing to do; both return an empty summary.
    pub async fn with_each_merged(
        &self,
        agent: &dyn Agent,
        uploader: &dyn MergedUploader,
        cancel: &CancellationToken,
    ) -> Result<ProcessedFiles, ErrorList> {
        let dir = match self.isolate_mergable_dir() {
            Ok(dir) => dir,
            Err(e) => {
                debug!(shard = %self.shard.name, error = %e, "nothing to isolate");
                return Ok(ProcessedFiles::empty(&self.shard.name));
            }
        };
        self.merge_cutoff_dir(&dir, agent, uploader, cancel).await
    }

    /// Merge an already-isolated cutoff directory. Re-running on the same
    /// directory is idempotent: outputs are content-addressed.
    pub async fn merge_cutoff_dir(
        &self,
        dir: &str,
        agent: &dyn Agent,
        uploader: &dyn MergedUploader,
        cancel: &CancellationToken,
    ) -> Result<ProcessedFiles, ErrorList> {
        let mut el = ErrorList::default();
        let mut processed = ProcessedFiles::empty(&self.shard.name);

        let positives = match self.store.glob(&format!("{}/*.ach", dir)) {
            Ok(p) => p,
            Err(e) => {
                el.add(anyhow::Error::new(e).context(format!("problem with {} glob", dir)));
                return Err(el);
            }
        };
        let negatives = match self.store.glob(&format!("{}/*.canceled", dir)) {
            Ok(n) => n,
            Err(e) => {
                el.add(anyhow::Error::new(e).context(format!("problem with {} glob", dir)));
                return Err(el);
            }
        };
        let matches = self.non_canceled_matches(&positives, &negatives);

        info!(
            shard = %self.shard.name,
            count = matches.len(),
            files = ?matches,
            "found matching ACH files"
        );

        let mut files = Vec::new();
        for path in &matches {
            if cancel.is_cancelled() {
                break;
            }
            match self.read_file(path) {
                Ok(file) => files.push(file),
                Err(e) => el.add(e.context(format!("problem reading {}", path))),
            }
        }

        let merged = match &self.shard.mergable.conditions {
            Some(conditions) => merge_files_with(&files, conditions),
            None => merge_files(&files),
        };
        let mut merged = match merged {
            Ok(m) => m,
            Err(e) => {
                el.add(anyhow::Error::new(e).context("unable to merge files"));
                Vec::new()
            }
        };

        if !matches.is_empty() {
            info!(
                shard = %self.shard.name,
                input = matches.len(),
                output = merged.len(),
                "merged ACH files"
            );
        }

        if merged.is_empty() {
            // nothing to upload; delete the batch directory unless errors
            // (or a cancellation) mean an operator may want to re-run it
            if el.is_empty() && !cancel.is_cancelled()
                && let Err(e) = self.store.rmdir_all(dir)
            {
                el.add(e);
            }
        } else {
            let uploaded = format!("{}/uploaded", dir);
            if let Err(e) = self.store.mkdir_all(&uploaded) {
                el.add(e);
            }
        }

        let leader_key = format!("outbound/{}", self.shard.name);
        for (i, file) in merged.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                info!(shard = %self.shard.name, "cutoff cancelled, stopping before next file");
                break;
            }

            if self.shard.mergable.flatten_batches {
                *file = flatten_batches(file);
            }

            // cache what we would upload first, keyed by content hash
            let text = match nacha::write_file(file) {
                Ok(text) => text,
                Err(e) => {
                    el.add(anyhow::Error::new(e).context("problem writing merged file"));
                    continue;
                }
            };
            let filename = format!("{}.ach", sha256_hex(text.as_bytes()));
            if let Err(e) = self
                .store
                .write(format!("{}/uploaded/{}", dir, filename), text.as_bytes())
            {
                el.add(anyhow::Error::new(e).context("problem writing merged file"));
                continue;
            }

            debug!(shard = %self.shard.name, key = %leader_key, "attempting to acquire outbound leadership");
            match self.leases.acquire_lock(&leader_key).await {
                Err(e) => {
                    // normal follower behavior, another replica owns this cutoff
                    warn!(shard = %self.shard.name, error = %e, "skipping file upload");
                }
                Ok(()) => {
                    info!(shard = %self.shard.name, "we are the leader");
                    match uploader.upload(i, agent, file).await {
                        Ok(()) => processed.successful_remote_writes += 1,
                        Err(e) => el.add(e.context("problem from callback")),
                    }
                }
            }
        }

        info!(
            shard = %self.shard.name,
            written = processed.successful_remote_writes,
            merged = merged.len(),
            "wrote merged files to remote agent"
        );

        if !el.is_empty() {
            return Err(el);
        }

        processed.file_ids = positives
            .iter()
            .filter_map(|p| {
                p.rsplit('/')
                    .next()
                    .and_then(|name| name.strip_suffix(".ach"))
                    .map(String::from)
            })
            .collect();
        Ok(processed)
    }
}
