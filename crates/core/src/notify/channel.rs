use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::StageError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Rich delivery channel. Failures are reported as `StageError::Delivery`.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), StageError>;
}

/// Records sent messages; optionally fails every send.
#[derive(Clone, Debug, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    attempts: Arc<Mutex<usize>>,
    failure: Option<String>,
}

impl RecordingChannel {
    pub fn failing(detail: impl Into<String>) -> Self {
        Self { failure: Some(detail.into()), ..Self::default() }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn attempts(&self) -> usize {
        match self.attempts.lock() {
            Ok(attempts) => *attempts,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, message: &EmailMessage) -> Result<(), StageError> {
        match self.attempts.lock() {
            Ok(mut attempts) => *attempts += 1,
            Err(poisoned) => *poisoned.into_inner() += 1,
        }
        if let Some(detail) = &self.failure {
            return Err(StageError::Delivery(detail.clone()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}
