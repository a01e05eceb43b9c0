//! Producer ingress contract.
//!
//! Upstream transports (HTTP, Kafka) resolve their payloads into these
//! types before handing them to a shard's merging pipeline.

use crate::nacha::{NachaFile, ValidateOpts};

/// A single ACH transfer accepted from an upstream producer.
#[derive(Debug, Clone)]
pub struct AchFile {
    /// Stable unique id; becomes the pending file's base name
    pub file_id: String,
    /// Routing hint used to pick the shard
    pub shard_key: String,
    /// Parsed NACHA document
    pub file: NachaFile,
    /// Codec flags persisted alongside the pending file
    pub validate_opts: Option<ValidateOpts>,
}

/// Cancels a previously accepted transfer before its cutoff.
#[derive(Debug, Clone)]
pub struct CancelAchFile {
    pub file_id: String,
}
