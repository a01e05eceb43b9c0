//! Per-file event notifications.
//!
//! Two severities: `info` for successful uploads/downloads, `critical`
//! for failures. Fan-out to the configured sinks is best-effort and
//! parallel; one sink's failure never blocks another.

pub mod mock;
pub mod pagerduty;
pub mod slack;

pub use mock::MockNotifier;
pub use pagerduty::PagerDutyNotifier;
pub use slack::SlackNotifier;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::warn;

use crate::config::NotificationsConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected message: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub direction: Direction,
    pub filename: String,
    /// The remote host involved, from the agent
    pub hostname: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn info(&self, msg: &Message) -> Result<(), NotifyError>;
    async fn critical(&self, msg: &Message) -> Result<(), NotifyError>;
}

/// Fan-out over every configured sink.
#[derive(Clone, Default)]
pub struct MultiSender {
    senders: Vec<Arc<dyn Notifier>>,
}

impl MultiSender {
    pub fn new(senders: Vec<Arc<dyn Notifier>>) -> Self {
        Self { senders }
    }

    pub fn from_config(cfg: &NotificationsConfig) -> Self {
        let mut senders: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(slack) = &cfg.slack {
            senders.push(Arc::new(SlackNotifier::new(slack.clone())));
        }
        if let Some(pd) = &cfg.pagerduty {
            senders.push(Arc::new(PagerDutyNotifier::new(pd.clone())));
        }
        Self { senders }
    }

    pub async fn info(&self, msg: &Message) {
        let sends = self.senders.iter().map(|s| s.info(msg));
        for result in join_all(sends).await {
            if let Err(e) = result {
                warn!(error = %e, filename = %msg.filename, "info notification failed");
            }
        }
    }

    pub async fn critical(&self, msg: &Message) {
        let sends = self.senders.iter().map(|s| s.critical(msg));
        for result in join_all(sends).await {
            if let Err(e) = result {
                warn!(error = %e, filename = %msg.filename, "critical notification failed");
            }
        }
    }
}
