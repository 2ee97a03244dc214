pub mod budget;
pub mod config;
pub mod doctor;
pub mod notify;
pub mod run;
pub mod search;

use std::future::Future;
use std::sync::Arc;

use dealwatch_agent::{OpenAiCompletionService, ResendChannel};
use dealwatch_core::config::{AppConfig, LoadOptions};
use dealwatch_core::errors::{PipelineError, StageError};
use dealwatch_core::notify::{FallbackOutlet, NotificationDispatcher};
use serde::Serialize;

pub const EXIT_OK: u8 = 0;
pub const EXIT_NOT_DELIVERED: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_STAGE_FAILED: u8 = 3;
pub const EXIT_RUNTIME: u8 = 4;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    /// Successful run whose stdout is the command's own data rather than an outcome record.
    pub fn data(output: impl Into<String>) -> Self {
        Self { exit_code: EXIT_OK, output: output.into() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn usage(command: &str, message: impl Into<String>) -> Self {
        Self::failure(command, "usage", message, EXIT_CONFIG)
    }

    pub fn stage_failure(command: &str, error: &StageError) -> Self {
        let exit_code = match error {
            StageError::Configuration(_) => EXIT_CONFIG,
            _ => EXIT_STAGE_FAILED,
        };
        Self::failure(command, error.kind().as_str(), error.to_string(), exit_code)
    }

    pub fn pipeline_failure(command: &str, error: &PipelineError) -> Self {
        let exit_code = match error {
            PipelineError::Stage { source: StageError::Configuration(_), .. } => EXIT_CONFIG,
            _ => EXIT_STAGE_FAILED,
        };
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
    })
}

pub(crate) fn completion_service(
    command: &str,
    config: &AppConfig,
) -> Result<Arc<OpenAiCompletionService>, CommandResult> {
    OpenAiCompletionService::from_config(config)
        .map(Arc::new)
        .map_err(|error| CommandResult::stage_failure(command, &error))
}

/// Text fallback to `outlet` always; email unless `no_email` or no provider key is configured.
pub(crate) fn dispatcher(
    command: &str,
    config: &AppConfig,
    no_email: bool,
    outlet: Arc<dyn FallbackOutlet>,
) -> Result<NotificationDispatcher, CommandResult> {
    let dispatcher = NotificationDispatcher::new(config.notify.shared_secret.clone(), outlet);
    if no_email {
        return Ok(dispatcher);
    }
    match ResendChannel::from_config(config) {
        Ok(Some(channel)) => Ok(dispatcher.with_channel(Arc::new(channel))),
        Ok(None) => Ok(dispatcher),
        Err(error) => Err(CommandResult::stage_failure(command, &error)),
    }
}

/// Drives one command future on a dedicated current-thread runtime.
pub(crate) fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        })?;
    Ok(runtime.block_on(future))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
