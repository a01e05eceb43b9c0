//! ACH gateway core.
//!
//! Accepts ACH transfers from upstream producers, durably stages them per
//! routing shard, merges them into NACHA files at cutoffs, and uploads
//! the merged files to an ODFI. Symmetrically polls the ODFI for return,
//! reconciliation, and inbound files and hands them downstream.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration with env overrides and validation
//! - [`incoming`] - Producer ingress contract (transfers and cancels)
//! - [`nacha`] - NACHA codec: reader, writer, merge, flatten
//! - [`storage`] - Durable staging store with atomic directory rename
//! - [`pipeline`] - Cutoff orchestration: isolate, merge, elect, upload
//! - [`upload`] - Remote transfer agents (filesystem, mock)
//! - [`lease`] - Leader election for the upload phase
//! - [`odfi`] - Inbound poller and download scratch trees
//! - [`notify`] - Per-file event fan-out (Slack, PagerDuty)
//! - [`metrics`] - Prometheus counters

pub mod config;
pub mod incoming;
pub mod lease;
pub mod logging;
pub mod metrics;
pub mod nacha;
pub mod notify;
pub mod odfi;
pub mod pipeline;
pub mod storage;
pub mod upload;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use incoming::{AchFile, CancelAchFile};
pub use metrics::GatewayMetrics;
pub use pipeline::{CutoffWorker, ProcessedFiles, ShardMerging};
pub use storage::FilesystemStore;
