use std::time::Duration;

use async_trait::async_trait;
use dealwatch_core::config::AppConfig;
use dealwatch_core::errors::StageError;
use dealwatch_core::notify::{EmailMessage, NotificationChannel};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

pub const RESEND_API_URL: &str = "https://api.resend.com";

/// Sends notification email through the Resend HTTP API.
pub struct ResendChannel {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    from_address: String,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl ResendChannel {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        from_address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StageError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            StageError::Configuration(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key,
            from_address: from_address.into(),
        })
    }

    /// `None` when no email credential is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, StageError> {
        if !config.email_configured() {
            return Ok(None);
        }
        let Some(api_key) = config.notify.resend_api_key.clone() else {
            return Ok(None);
        };
        Self::new(
            RESEND_API_URL,
            api_key,
            config.notify.from_address.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )
        .map(Some)
    }
}

#[async_trait]
impl NotificationChannel for ResendChannel {
    async fn send(&self, message: &EmailMessage) -> Result<(), StageError> {
        let body = SendEmailBody {
            from: &self.from_address,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html_body,
            text: &message.text_body,
        };
        debug!(event_name = "email.request", to = %message.to, "sending email");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| StageError::Delivery(format!("email request failed: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(StageError::Delivery(format!("email provider returned {status}: {detail}")))
    }
}
