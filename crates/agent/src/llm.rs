use std::time::Duration;

use async_trait::async_trait;
use dealwatch_core::completion::{
    CapabilityChoice, CapabilityInvocation, ChatMessage, Completion, CompletionRequest,
    CompletionService, Role,
};
use dealwatch_core::config::AppConfig;
use dealwatch_core::errors::StageError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompletionService {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    default_model: String,
}

impl OpenAiCompletionService {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StageError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            StageError::Configuration(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|key| !key.expose_secret().trim().is_empty()),
            default_model: default_model.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StageError> {
        Self::new(
            &config.llm.base_url,
            config.llm_credential().cloned(),
            config.llm.model.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, StageError> {
        let Some(api_key) = &self.api_key else {
            return Err(StageError::Configuration(
                "no completion service credential is configured".to_owned(),
            ));
        };

        let model = request.model.clone().unwrap_or_else(|| self.default_model.clone());
        let body = WireRequest::from_request(model, &request);
        debug!(
            event_name = "llm.request",
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| StageError::Upstream(format!("request failed: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| StageError::Upstream(format!("failed to read response: {error}")))?;
        if !status.is_success() {
            return Err(StageError::Upstream(format!(
                "completion endpoint returned {status}: {}",
                truncate(&text, 300)
            )));
        }

        let parsed: WireResponse = serde_json::from_str(&text).map_err(|error| {
            StageError::Upstream(format!("malformed completion response: {error}"))
        })?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| StageError::Upstream("completion response had no choices".to_owned()))?;

        let invocation = message.tool_calls.into_iter().flatten().next().map(|call| {
            CapabilityInvocation {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }
        });
        Ok(Completion { text: message.content, invocation })
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl WireRequest {
    fn from_request(model: String, request: &CompletionRequest) -> Self {
        let tools = (!request.capabilities.is_empty()).then(|| {
            request
                .capabilities
                .iter()
                .map(|capability| WireTool {
                    tool_type: "function",
                    function: WireFunction {
                        name: capability.name.clone(),
                        description: capability.description.clone(),
                        parameters: capability.parameters.clone(),
                    },
                })
                .collect()
        });
        let tool_choice = tools.as_ref().map(|_| match &request.capability_choice {
            CapabilityChoice::Auto => json!("auto"),
            CapabilityChoice::Required(name) => {
                json!({"type": "function", "function": {"name": name}})
            }
        });

        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools,
            tool_choice,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        Self {
            role,
            content: message.content.clone(),
            tool_calls: message
                .invocations
                .iter()
                .map(|invocation| WireToolCall {
                    id: invocation.id.clone(),
                    call_type: "function".to_owned(),
                    function: WireCall {
                        name: invocation.name.clone(),
                        arguments: invocation.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: message.invocation_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    call_type: String,
    function: WireCall,
}

#[derive(Serialize, Deserialize)]
struct WireCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}
