//! Cutoff pipeline: durable staging, merging, and leader-elected upload.
//!
//! Transfers accepted via [`ShardMerging::handle_xfer`] are staged per
//! shard until a cutoff isolates them, merges them into NACHA files, and
//! offers each merged file for upload. [`CutoffWorker`] drives cutoffs on
//! an interval or an external trigger.

pub mod cutoff;
pub mod merging;

pub use cutoff::{CutoffTrigger, CutoffWorker, RemoteUploader};
pub use merging::{MergedUploader, ProcessedFiles, ShardMerging};

use std::fmt;

use sha2::{Digest, Sha256};

/// Errors accumulated over one cutoff. Per-file failures do not stop the
/// rest of the batch; the full list is surfaced at the cutoff boundary.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<anyhow::Error>,
}

impl ErrorList {
    pub fn add(&mut self, err: impl Into<anyhow::Error>) {
        self.errors.push(err.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", joined.join("; "))
    }
}

impl std::error::Error for ErrorList {}

/// Hex-encoded SHA-256, the primary key of a merged output file.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
