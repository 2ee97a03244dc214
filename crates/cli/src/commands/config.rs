use std::env;
use std::fs;
use std::path::Path;

use dealwatch_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// Config keys with the environment variables that can set them, in lookup order.
const FIELDS: [(&str, &[&str]); 16] = [
    ("llm.api_key", &["DEALWATCH_LLM_API_KEY", "OPENAI_API_KEY"]),
    ("llm.base_url", &["DEALWATCH_LLM_BASE_URL"]),
    ("llm.model", &["DEALWATCH_LLM_MODEL"]),
    ("llm.search_model", &["DEALWATCH_LLM_SEARCH_MODEL"]),
    ("llm.timeout_secs", &["DEALWATCH_LLM_TIMEOUT_SECS"]),
    ("notify.shared_secret", &["DEALWATCH_NOTIFY_SHARED_SECRET"]),
    ("notify.resend_api_key", &["DEALWATCH_NOTIFY_RESEND_API_KEY", "RESEND_API_KEY"]),
    ("notify.from_address", &["DEALWATCH_NOTIFY_FROM_ADDRESS", "RESEND_FROM_EMAIL"]),
    ("notify.prefer_email", &["DEALWATCH_NOTIFY_PREFER_EMAIL"]),
    ("notify.contact", &["DEALWATCH_NOTIFY_CONTACT"]),
    ("search.blocked_hosts", &["DEALWATCH_SEARCH_BLOCKED_HOSTS"]),
    ("search.cycle_interval_secs", &["DEALWATCH_SEARCH_CYCLE_INTERVAL_SECS"]),
    ("search.max_tokens", &["DEALWATCH_SEARCH_MAX_TOKENS"]),
    ("search.temperature", &["DEALWATCH_SEARCH_TEMPERATURE"]),
    ("logging.level", &["DEALWATCH_LOGGING_LEVEL", "DEALWATCH_LOG_LEVEL"]),
    ("logging.format", &["DEALWATCH_LOGGING_FORMAT", "DEALWATCH_LOG_FORMAT"]),
];

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let cli_keys = overridden_keys(&options.overrides);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: cli > env > file > default):".to_string()];
    for (key, env_keys) in FIELDS {
        let source = if cli_keys.contains(&key) {
            "cli".to_string()
        } else {
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
        };
        lines.push(render_line(key, &display_value(&config, key), source));
    }
    lines.join("\n")
}

fn overridden_keys(overrides: &ConfigOverrides) -> Vec<&'static str> {
    [
        ("logging.level", overrides.log_level.is_some()),
        ("llm.model", overrides.llm_model.is_some()),
        ("llm.search_model", overrides.llm_search_model.is_some()),
        ("notify.contact", overrides.notify_contact.is_some()),
        ("notify.prefer_email", overrides.notify_prefer_email.is_some()),
        ("search.cycle_interval_secs", overrides.search_cycle_interval_secs.is_some()),
    ]
    .into_iter()
    .filter_map(|(key, set)| set.then_some(key))
    .collect()
}

fn display_value(config: &AppConfig, key: &str) -> String {
    match key {
        "llm.api_key" => redact_secret(config.llm.api_key.as_ref()),
        "llm.base_url" => config.llm.base_url.clone(),
        "llm.model" => config.llm.model.clone(),
        "llm.search_model" => config.llm.search_model.clone(),
        "llm.timeout_secs" => config.llm.timeout_secs.to_string(),
        "notify.shared_secret" => redact_secret(config.notify.shared_secret.as_ref()),
        "notify.resend_api_key" => redact_secret(config.notify.resend_api_key.as_ref()),
        "notify.from_address" => config.notify.from_address.clone(),
        "notify.prefer_email" => config.notify.prefer_email.to_string(),
        "notify.contact" => config.notify.contact.as_deref().unwrap_or("<unset>").to_string(),
        "search.blocked_hosts" if config.search.blocked_hosts.is_empty() => "[]".to_string(),
        "search.blocked_hosts" => format!("[{}]", config.search.blocked_hosts.join(", ")),
        "search.cycle_interval_secs" => config.search.cycle_interval_secs.to_string(),
        "search.max_tokens" => config.search.max_tokens.to_string(),
        "search.temperature" => config.search.temperature.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format),
        _ => "<unknown>".to_string(),
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognizable key prefix such as `sk-` or `re_` and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(['-', '_']) {
        Some(index) if index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}
