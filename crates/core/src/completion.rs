//! Language-model completion boundary.
//!
//! Stages talk to the model only through [`CompletionService`]. A reply is
//! either plain text or a single named capability invocation whose JSON
//! arguments the caller validates before acting on them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StageError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON argument payload as produced by the model.
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<CapabilityInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that carried a capability invocation.
    pub fn assistant_invocation(content: Option<String>, invocation: CapabilityInvocation) -> Self {
        Self { role: Role::Assistant, content, invocations: vec![invocation], invocation_id: None }
    }

    /// Outcome reported back for an invocation.
    pub fn tool_outcome(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            invocations: Vec::new(),
            invocation_id: Some(invocation_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), invocations: Vec::new(), invocation_id: None }
    }
}

/// A capability the model may invoke, described by a JSON schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityChoice {
    #[default]
    Auto,
    Required(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model override; the service default applies when unset.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub capabilities: Vec<CapabilitySpec>,
    pub capability_choice: CapabilityChoice,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilitySpec>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_choice(mut self, choice: CapabilityChoice) -> Self {
        self.capability_choice = choice;
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: Option<String>,
    pub invocation: Option<CapabilityInvocation>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), invocation: None }
    }

    pub fn invocation(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            text: None,
            invocation: Some(CapabilityInvocation {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Whether a model-access credential is available. Callers check this
    /// before issuing any request.
    fn has_credential(&self) -> bool;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, StageError>;
}

/// Replays queued replies in order and records every request it receives.
#[derive(Clone)]
pub struct ScriptedCompletionService {
    replies: Arc<Mutex<VecDeque<Result<Completion, StageError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    credential: bool,
}

impl Default for ScriptedCompletionService {
    fn default() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            credential: true,
        }
    }
}

impl ScriptedCompletionService {
    pub fn new(replies: Vec<Result<Completion, StageError>>) -> Self {
        Self { replies: Arc::new(Mutex::new(replies.into())), ..Self::default() }
    }

    pub fn without_credential() -> Self {
        Self { credential: false, ..Self::default() }
    }

    pub fn push(&self, reply: Result<Completion, StageError>) {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, StageError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Err(StageError::Upstream("no scripted reply left".to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ChatMessage, Completion, CompletionRequest, CompletionService, Role,
        ScriptedCompletionService,
    };
    use crate::errors::StageError;

    #[tokio::test]
    async fn scripted_service_replays_in_order_and_records_requests() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("799")),
            Err(StageError::Upstream("connection reset".to_owned())),
        ]);

        let first = service.complete(CompletionRequest::new(vec![ChatMessage::user("a")])).await;
        let second = service.complete(CompletionRequest::new(vec![ChatMessage::user("b")])).await;
        let third = service.complete(CompletionRequest::default()).await;

        assert_eq!(first.ok().and_then(|reply| reply.text), Some("799".to_owned()));
        assert!(matches!(second, Err(StageError::Upstream(_))));
        assert!(third.is_err());
        assert_eq!(service.call_count(), 3);
        assert_eq!(service.requests()[1].messages[0].content.as_deref(), Some("b"));
    }

    #[test]
    fn tool_outcome_references_invocation() {
        let message = ChatMessage::tool_outcome("call_1", "rejected");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.invocation_id.as_deref(), Some("call_1"));
    }
}
