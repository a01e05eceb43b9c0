//! PagerDuty Events API v2 sink.
//!
//! Configured for failure paging only: info notifications are skipped.
//! Download failures are sent at warning severity since they retry on
//! the next poll.

use async_trait::async_trait;
use serde_json::json;

use super::{Direction, Message, Notifier, NotifyError};
use crate::config::PagerDutyConfig;

const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

pub struct PagerDutyNotifier {
    client: reqwest::Client,
    routing_key: String,
}

impl PagerDutyNotifier {
    pub fn new(cfg: PagerDutyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            routing_key: cfg.routing_key,
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    async fn info(&self, _msg: &Message) -> Result<(), NotifyError> {
        // PagerDuty is set up for critical alerts
        Ok(())
    }

    async fn critical(&self, msg: &Message) -> Result<(), NotifyError> {
        let severity = match msg.direction {
            Direction::Upload => "critical",
            Direction::Download => "warning",
        };
        let detail = msg.error.as_deref().unwrap_or("unknown error");

        let resp = self
            .client
            .post(EVENTS_URL)
            .json(&json!({
                "routing_key": self.routing_key,
                "event_action": "trigger",
                "payload": {
                    "summary": format!(
                        "FAILURE on {} of {}: {}",
                        msg.direction, msg.filename, detail
                    ),
                    "source": msg.hostname,
                    "severity": severity,
                },
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "pagerduty events api returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
