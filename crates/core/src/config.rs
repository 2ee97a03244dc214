use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub notify: NotifyConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub search_model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub shared_secret: Option<SecretString>,
    pub resend_api_key: Option<SecretString>,
    pub from_address: String,
    pub prefer_email: bool,
    pub contact: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub blocked_hosts: Vec<String>,
    pub cycle_interval_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_search_model: Option<String>,
    pub notify_contact: Option<String>,
    pub notify_prefer_email: Option<bool>,
    pub search_cycle_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["dealwatch.toml", "config/dealwatch.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4.1-mini".to_string(),
                search_model: "gpt-4.1".to_string(),
                timeout_secs: 60,
            },
            notify: NotifyConfig {
                shared_secret: None,
                resend_api_key: None,
                from_address: "Notifier <onboarding@resend.dev>".to_string(),
                prefer_email: true,
                contact: None,
            },
            search: SearchConfig {
                blocked_hosts: Vec::new(),
                cycle_interval_secs: 24 * 60 * 60,
                max_tokens: 250,
                temperature: 0.7,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Credential for the completion service, if one is configured and non-blank.
    pub fn llm_credential(&self) -> Option<&SecretString> {
        self.llm.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty())
    }

    pub fn email_configured(&self) -> bool {
        self.notify
            .resend_api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(search_model) = llm.search_model {
                self.llm.search_model = search_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(notify) = patch.notify {
            if let Some(shared_secret_value) = notify.shared_secret {
                self.notify.shared_secret = Some(secret_value(shared_secret_value));
            }
            if let Some(resend_api_key_value) = notify.resend_api_key {
                self.notify.resend_api_key = Some(secret_value(resend_api_key_value));
            }
            if let Some(from_address) = notify.from_address {
                self.notify.from_address = from_address;
            }
            if let Some(prefer_email) = notify.prefer_email {
                self.notify.prefer_email = prefer_email;
            }
            if let Some(contact) = notify.contact {
                self.notify.contact = Some(contact);
            }
        }

        if let Some(search) = patch.search {
            if let Some(blocked_hosts) = search.blocked_hosts {
                self.search.blocked_hosts = normalize_hosts(blocked_hosts);
            }
            if let Some(cycle_interval_secs) = search.cycle_interval_secs {
                self.search.cycle_interval_secs = cycle_interval_secs;
            }
            if let Some(max_tokens) = search.max_tokens {
                self.search.max_tokens = max_tokens;
            }
            if let Some(temperature) = search.temperature {
                self.search.temperature = temperature;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let llm_api_key = read_env("DEALWATCH_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEALWATCH_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("DEALWATCH_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DEALWATCH_LLM_SEARCH_MODEL") {
            self.llm.search_model = value;
        }
        if let Some(value) = read_env("DEALWATCH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DEALWATCH_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEALWATCH_NOTIFY_SHARED_SECRET") {
            self.notify.shared_secret = Some(secret_value(value));
        }
        let resend_api_key =
            read_env("DEALWATCH_NOTIFY_RESEND_API_KEY").or_else(|| read_env("RESEND_API_KEY"));
        if let Some(value) = resend_api_key {
            self.notify.resend_api_key = Some(secret_value(value));
        }
        let from_address =
            read_env("DEALWATCH_NOTIFY_FROM_ADDRESS").or_else(|| read_env("RESEND_FROM_EMAIL"));
        if let Some(value) = from_address {
            self.notify.from_address = value;
        }
        if let Some(value) = read_env("DEALWATCH_NOTIFY_PREFER_EMAIL") {
            self.notify.prefer_email = parse_bool("DEALWATCH_NOTIFY_PREFER_EMAIL", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_NOTIFY_CONTACT") {
            self.notify.contact = Some(value);
        }

        if let Some(value) = read_env("DEALWATCH_SEARCH_BLOCKED_HOSTS") {
            self.search.blocked_hosts =
                normalize_hosts(value.split(',').map(str::to_string).collect());
        }
        if let Some(value) = read_env("DEALWATCH_SEARCH_CYCLE_INTERVAL_SECS") {
            self.search.cycle_interval_secs =
                parse_u64("DEALWATCH_SEARCH_CYCLE_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_SEARCH_MAX_TOKENS") {
            self.search.max_tokens = parse_u32("DEALWATCH_SEARCH_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_SEARCH_TEMPERATURE") {
            self.search.temperature = parse_f32("DEALWATCH_SEARCH_TEMPERATURE", &value)?;
        }

        let log_level =
            read_env("DEALWATCH_LOGGING_LEVEL").or_else(|| read_env("DEALWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALWATCH_LOGGING_FORMAT").or_else(|| read_env("DEALWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_search_model) = overrides.llm_search_model {
            self.llm.search_model = llm_search_model;
        }
        if let Some(contact) = overrides.notify_contact {
            self.notify.contact = Some(contact);
        }
        if let Some(prefer_email) = overrides.notify_prefer_email {
            self.notify.prefer_email = prefer_email;
        }
        if let Some(cycle_interval_secs) = overrides.search_cycle_interval_secs {
            self.search.cycle_interval_secs = cycle_interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_notify(&self.notify)?;
        validate_search(&self.search)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn normalize_hosts(hosts: Vec<String>) -> Vec<String> {
    hosts
        .into_iter()
        .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() || llm.search_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.search_model must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_notify(notify: &NotifyConfig) -> Result<(), ConfigError> {
    let email_enabled = notify.resend_api_key.is_some();
    if email_enabled && notify.from_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notify.from_address is required when notify.resend_api_key is set".to_string(),
        ));
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.cycle_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "search.cycle_interval_secs must be greater than zero".to_string(),
        ));
    }

    if search.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "search.max_tokens must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&search.temperature) {
        return Err(ConfigError::Validation(
            "search.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    notify: Option<NotifyPatch>,
    search: Option<SearchPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    search_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifyPatch {
    shared_secret: Option<String>,
    resend_api_key: Option<String>,
    from_address: Option<String>,
    prefer_email: Option<bool>,
    contact: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    blocked_hosts: Option<Vec<String>>,
    cycle_interval_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
