//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde_json::json;

use super::{Message, Notifier, NotifyError};
use crate::config::SlackConfig;

pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(cfg: SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: cfg.webhook_url,
        }
    }

    async fn post(&self, text: String) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "slack webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn info(&self, msg: &Message) -> Result<(), NotifyError> {
        self.post(format!(
            "successful {} of {} with {}",
            msg.direction, msg.filename, msg.hostname
        ))
        .await
    }

    async fn critical(&self, msg: &Message) -> Result<(), NotifyError> {
        let detail = msg.error.as_deref().unwrap_or("unknown error");
        self.post(format!(
            "ERROR during {} of {} with {}: {}",
            msg.direction, msg.filename, msg.hostname, detail
        ))
        .await
    }
}
