use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use dealwatch_core::config::LoadOptions;
use dealwatch_core::notify::{NotificationRequest, StdoutOutlet};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;

use super::{block_on, dispatcher, load_config, CommandResult, EXIT_CONFIG, EXIT_NOT_DELIVERED};

const COMMAND: &str = "notify";

#[derive(Debug, Clone, Args)]
pub struct NotifyArgs {
    #[arg(short, long, help = "Path to the JSON payload; omit to read stdin")]
    pub input: Option<PathBuf>,
    #[arg(short, long, help = "Override `user_contact` from the payload")]
    pub contact: Option<String>,
    #[arg(long, help = "Print the notification even if email is configured")]
    pub no_email: bool,
}

#[derive(Debug, Deserialize)]
pub struct NotifyPayload {
    pub product: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub user_contact: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// A single link or a list of them.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum Links {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Links {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::One(link) => vec![link],
            Self::Many(links) => links,
        }
    }
}

impl NotifyPayload {
    pub fn into_request(self, contact: Option<String>, prefer_email: bool) -> NotificationRequest {
        NotificationRequest {
            product: self.product,
            price: self.price,
            links: self.links.into_vec(),
            contact: contact.or(self.user_contact).filter(|value| !value.trim().is_empty()),
            shared_secret: self.api_key.map(SecretString::from),
            prefer_email,
        }
    }
}

/// Exit code 0 when the notification went out, 1 when it was refused.
pub fn run(args: &NotifyArgs, options: LoadOptions) -> CommandResult {
    let raw = match read_payload(args.input.as_ref()) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "data",
                format!("could not read JSON payload: {error}"),
                EXIT_CONFIG,
            )
        }
    };
    let payload: NotifyPayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "data",
                format!("could not parse JSON payload: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let dispatcher = match dispatcher(COMMAND, &config, args.no_email, Arc::new(StdoutOutlet)) {
        Ok(dispatcher) => dispatcher,
        Err(result) => return result,
    };

    let prefer_email = !args.no_email && config.notify.prefer_email;
    let mut request = payload.into_request(args.contact.clone(), prefer_email);
    if request.contact.is_none() {
        request.contact = config.notify.contact.clone();
    }

    match block_on(COMMAND, dispatcher.notify(&request)) {
        Ok(true) => CommandResult::success(COMMAND, format!("notified about {}", request.product)),
        Ok(false) => CommandResult::failure(
            COMMAND,
            "authorization",
            "notification not sent: shared secret was missing or did not match",
            EXIT_NOT_DELIVERED,
        ),
        Err(result) => result,
    }
}

fn read_payload(input: Option<&PathBuf>) -> io::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path),
        None => io::read_to_string(io::stdin()),
    }
}

#[cfg(test)]
mod tests {
    use super::NotifyPayload;

    #[test]
    fn single_link_string_becomes_one_candidate() {
        let payload: NotifyPayload = serde_json::from_str(
            r#"{"product":"Laptop","price":950.0,"links":"https://shop.example/l","api_key":"s"}"#,
        )
        .expect("payload parses");
        let request = payload.into_request(None, false);
        assert_eq!(request.links, vec!["https://shop.example/l".to_owned()]);
        assert!(request.shared_secret.is_some());
    }

    #[test]
    fn contact_override_wins_over_payload() {
        let payload: NotifyPayload = serde_json::from_str(
            r#"{"product":"Laptop","links":["a","b"],"user_contact":"old@example.com"}"#,
        )
        .expect("payload parses");
        let request = payload.into_request(Some("new@example.com".to_owned()), true);
        assert_eq!(request.contact.as_deref(), Some("new@example.com"));
        assert_eq!(request.links.len(), 2);
        assert_eq!(request.price, None);
    }
}
