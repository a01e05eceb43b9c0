//! Recording sink for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Message, Notifier, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Critical,
}

pub struct MockNotifier {
    messages: Mutex<Vec<(Severity, Message)>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink whose sends always error, for fan-out isolation tests.
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<(Severity, Message)> {
        self.messages.lock().unwrap().clone()
    }

    fn record(&self, severity: Severity, msg: &Message) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Rejected("mock sink failure".to_string()));
        }
        self.messages.lock().unwrap().push((severity, msg.clone()));
        Ok(())
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn info(&self, msg: &Message) -> Result<(), NotifyError> {
        self.record(Severity::Info, msg)
    }

    async fn critical(&self, msg: &Message) -> Result<(), NotifyError> {
        self.record(Severity::Critical, msg)
    }
}
