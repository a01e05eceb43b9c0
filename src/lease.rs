//! Lease-based mutual exclusion for the upload phase.
//!
//! The gateway only assumes the lease is safe (one holder per key), not
//! fair. [`MemoryLeases`] provides a process-shared table suitable for
//! single-host deployments and for exercising multi-replica behavior in
//! tests; a distributed lock service plugs in behind [`LeaseService`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease for {key} held by {holder}")]
    Held { key: String, holder: String },

    #[error("lease service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LeaseService: Send + Sync {
    /// Try to acquire (or renew) the lease for `key`. An `Err` means
    /// another holder owns it; callers treat that as follower behavior.
    async fn acquire_lock(&self, key: &str) -> Result<(), LeaseError>;
}

struct LeaseEntry {
    holder: String,
    expires_at: Instant,
}

/// Shared lease table with a fixed TTL.
pub struct MemoryLeases {
    entries: Mutex<HashMap<String, LeaseEntry>>,
    ttl: Duration,
}

impl MemoryLeases {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        })
    }

    /// A handle for one replica, identified by `holder`.
    pub fn client(self: &Arc<Self>, holder: impl Into<String>) -> LeaseClient {
        LeaseClient {
            leases: Arc::clone(self),
            holder: holder.into(),
        }
    }

    fn try_acquire(&self, key: &str, holder: &str) -> Result<(), LeaseError> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.holder != holder && entry.expires_at > now => {
                Err(LeaseError::Held {
                    key: key.to_string(),
                    holder: entry.holder.clone(),
                })
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    LeaseEntry {
                        holder: holder.to_string(),
                        expires_at: now + self.ttl,
                    },
                );
                Ok(())
            }
        }
    }
}

/// One replica's view of the shared lease table.
#[derive(Clone)]
pub struct LeaseClient {
    leases: Arc<MemoryLeases>,
    holder: String,
}

#[async_trait]
impl LeaseService for LeaseClient {
    async fn acquire_lock(&self, key: &str) -> Result<(), LeaseError> {
        self.leases.try_acquire(key, &self.holder)
    }
}
