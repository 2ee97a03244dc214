use std::sync::Arc;

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{info, warn};

use crate::budget::format_usd;
use crate::domain::search::SearchResult;
use crate::domain::state::PipelineState;
use crate::errors::StageError;
use crate::notify::channel::{EmailMessage, NotificationChannel};
use crate::notify::outlet::FallbackOutlet;
use crate::notify::templates::{DealView, NotificationTemplates};

type HmacSha256 = Hmac<Sha256>;

const SECRET_TAG_KEY: &[u8] = b"dealwatch.notify.shared-secret";
const DIVIDER_WIDTH: usize = 50;

#[derive(Clone, Debug)]
pub struct NotificationRequest {
    pub product: String,
    pub price: Option<Decimal>,
    pub links: Vec<String>,
    pub contact: Option<String>,
    pub shared_secret: Option<SecretString>,
    pub prefer_email: bool,
}

impl NotificationRequest {
    /// Values the notification reports for a finished pipeline state.
    pub fn from_state(
        state: &PipelineState,
        contact: Option<String>,
        shared_secret: Option<SecretString>,
        prefer_email: bool,
    ) -> Self {
        let (product, price, links) = match &state.search_result {
            Some(SearchResult::Found { product_name, price, url, .. }) => (
                product_name.clone(),
                price.or(state.suggested_budget),
                vec![url.clone()],
            ),
            _ => (state.product.clone(), state.suggested_budget, Vec::new()),
        };
        Self { product, price, links, contact, shared_secret, prefer_email }
    }
}

/// Authorizes and emits one notification, by email when possible and as
/// plain text otherwise.
pub struct NotificationDispatcher {
    configured_secret: Option<SecretString>,
    channel: Option<Arc<dyn NotificationChannel>>,
    outlet: Arc<dyn FallbackOutlet>,
    templates: Option<NotificationTemplates>,
}

impl NotificationDispatcher {
    pub fn new(configured_secret: Option<SecretString>, outlet: Arc<dyn FallbackOutlet>) -> Self {
        let templates = match NotificationTemplates::embedded() {
            Ok(templates) => Some(templates),
            Err(error) => {
                warn!(event_name = "notify.templates_unavailable", %error, "email disabled");
                None
            }
        };
        Self { configured_secret, channel: None, outlet, templates }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Returns `false` only when authorization fails.
    pub async fn notify(&self, request: &NotificationRequest) -> bool {
        if let Err(error) = self.authorize(request.shared_secret.as_ref()) {
            warn!(
                event_name = "notify.unauthorized",
                error_class = error.kind().as_str(),
                detail = error.detail(),
                "notification not sent"
            );
            return false;
        }

        if let Some(contact) = self.email_recipient(request) {
            match self.send_email(contact, request).await {
                Ok(()) => {
                    info!(event_name = "notify.email_sent", to = contact, "notification emailed");
                    return true;
                }
                Err(error) => warn!(
                    event_name = "notify.email_failed",
                    error_class = error.kind().as_str(),
                    detail = error.detail(),
                    "email failed, falling back to text"
                ),
            }
        }

        self.outlet.emit(&fallback_text(request));
        info!(
            event_name = "notify.fallback_emitted",
            product = %request.product,
            "notification emitted as text"
        );
        true
    }

    pub async fn notify_state(
        &self,
        state: &PipelineState,
        contact: Option<String>,
        shared_secret: Option<SecretString>,
        prefer_email: bool,
    ) -> bool {
        self.notify(&NotificationRequest::from_state(state, contact, shared_secret, prefer_email))
            .await
    }

    fn authorize(&self, supplied: Option<&SecretString>) -> Result<(), StageError> {
        let Some(expected) = self.configured_secret.as_ref() else {
            return Err(StageError::Authorization(
                "no notification shared secret is configured".to_owned(),
            ));
        };
        let Some(supplied) = supplied else {
            return Err(StageError::Authorization("no shared secret supplied".to_owned()));
        };
        if secrets_match(expected.expose_secret(), supplied.expose_secret()) {
            Ok(())
        } else {
            Err(StageError::Authorization("shared secret mismatch".to_owned()))
        }
    }

    fn email_recipient<'a>(&self, request: &'a NotificationRequest) -> Option<&'a str> {
        if !request.prefer_email || self.channel.is_none() {
            return None;
        }
        request.contact.as_deref().filter(|contact| contact.contains('@'))
    }

    async fn send_email(&self, to: &str, request: &NotificationRequest) -> Result<(), StageError> {
        let (Some(channel), Some(templates)) = (&self.channel, &self.templates) else {
            return Err(StageError::Delivery("email channel is not configured".to_owned()));
        };
        let deal =
            DealView { product: &request.product, price: request.price, links: &request.links };
        let subject = match request.price {
            Some(price) => format!("Deal found: {} for ${}", request.product, format_usd(price)),
            None => format!("Deal found: {}", request.product),
        };
        let message = EmailMessage {
            to: to.to_owned(),
            subject,
            html_body: templates.render_html(&deal)?,
            text_body: templates.render_text(&deal)?,
        };
        channel.send(&message).await
    }
}

/// Compares secrets through HMAC tags so the check runs in constant time.
fn secrets_match(expected: &str, supplied: &str) -> bool {
    let tag = |secret: &str| {
        HmacSha256::new_from_slice(SECRET_TAG_KEY).map(|mut mac| {
            mac.update(secret.as_bytes());
            mac
        })
    };
    match (tag(expected), tag(supplied)) {
        (Ok(expected), Ok(supplied)) => {
            supplied.verify_slice(expected.finalize().into_bytes().as_slice()).is_ok()
        }
        _ => false,
    }
}

pub fn fallback_text(request: &NotificationRequest) -> String {
    let divider = "=".repeat(DIVIDER_WIDTH);
    let to_line = match request.contact.as_deref().filter(|contact| !contact.is_empty()) {
        Some(contact) => format!("Notification TO: {contact}"),
        None => "Notification (stdout only)".to_owned(),
    };
    let price = match request.price {
        Some(price) => format!("${}", format_usd(price)),
        None => "unavailable".to_owned(),
    };

    let mut lines = vec![
        divider.clone(),
        to_line,
        format!("Suggested Product: {}", request.product),
        format!("Price: {price}"),
        "Where to buy:".to_owned(),
    ];
    lines.extend(request.links.iter().map(|link| format!("  - {link}")));
    lines.push(String::new());
    lines.push("Do you want to buy this product? Reply 'yes' or 'no' to confirm.".to_owned());
    lines.push(divider);

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
