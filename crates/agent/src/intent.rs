use std::sync::Arc;

use async_trait::async_trait;
use dealwatch_core::completion::{
    CapabilityChoice, CapabilitySpec, ChatMessage, CompletionRequest, CompletionService,
};
use dealwatch_core::domain::intent::PurchaseIntent;
use dealwatch_core::errors::StageError;
use dealwatch_core::intake::IntentExtractionService;
use serde_json::json;
use tracing::info;

pub const EXTRACT_INTENT: &str = "extract_intent";

/// Extracts a purchase intent by forcing the model to call `extract_intent`.
pub struct LlmIntentExtractor {
    completions: Arc<dyn CompletionService>,
    model: Option<String>,
}

impl LlmIntentExtractor {
    pub fn new(completions: Arc<dyn CompletionService>) -> Self {
        Self { completions, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn capability() -> CapabilitySpec {
        CapabilitySpec {
            name: EXTRACT_INTENT.to_owned(),
            description: "Extract key fields about a purchase request".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "product": {"type": "string", "description": "Desired product or service"},
                    "timeframe": {"type": "string", "description": "When they want to buy"},
                    "desired_price": {"type": "string", "description": "Target or max price"},
                    "location": {"type": "string", "description": "Physical or online region"},
                    "provide_financials": {
                        "type": "boolean",
                        "description": "Whether they will upload data"
                    }
                },
                "required": ["product", "timeframe", "provide_financials"]
            }),
        }
    }
}

#[async_trait]
impl IntentExtractionService for LlmIntentExtractor {
    async fn extract(&self, text: &str) -> Result<PurchaseIntent, StageError> {
        if !self.completions.has_credential() {
            return Err(StageError::Configuration(
                "no completion service credential is configured".to_owned(),
            ));
        }

        let mut request = CompletionRequest::new(vec![
            ChatMessage::system("You extract structured purchase intents."),
            ChatMessage::user(text),
        ])
        .with_capabilities(vec![Self::capability()])
        .with_choice(CapabilityChoice::Required(EXTRACT_INTENT.to_owned()));
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let reply = self.completions.complete(request).await?;
        let invocation = reply
            .invocation
            .filter(|invocation| invocation.name == EXTRACT_INTENT)
            .ok_or_else(|| {
                StageError::UpstreamParse("model did not call extract_intent".to_owned())
            })?;
        let intent: PurchaseIntent =
            serde_json::from_str(&invocation.arguments).map_err(|error| {
                StageError::UpstreamParse(format!("invalid extract_intent arguments: {error}"))
            })?;

        info!(
            event_name = "intent.extracted",
            product = %intent.product,
            timeframe = %intent.timeframe,
            provide_financials = intent.provide_financials,
            "purchase intent extracted"
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dealwatch_core::completion::{CapabilityChoice, Completion, ScriptedCompletionService};
    use dealwatch_core::errors::{ErrorKind, StageError};
    use dealwatch_core::intake::IntentExtractionService;

    use super::{LlmIntentExtractor, EXTRACT_INTENT};

    #[tokio::test]
    async fn forced_capability_arguments_become_intent() {
        let service = ScriptedCompletionService::new(vec![Ok(Completion::invocation(
            "call_1",
            EXTRACT_INTENT,
            r#"{"product":"iPhone 15","timeframe":"in 3 months","provide_financials":true}"#,
        ))]);
        let extractor = LlmIntentExtractor::new(Arc::new(service.clone()));

        let intent = extractor.extract("buy an iPhone 15 in 3 months").await.expect("extracts");

        assert_eq!(intent.product, "iPhone 15");
        assert_eq!(intent.timeframe, "in 3 months");
        assert!(intent.provide_financials);
        assert_eq!(intent.desired_price, None);
        assert_eq!(
            service.requests()[0].capability_choice,
            CapabilityChoice::Required(EXTRACT_INTENT.to_owned())
        );
    }

    #[tokio::test]
    async fn plain_text_reply_is_a_parse_error() {
        let service = ScriptedCompletionService::new(vec![Ok(Completion::text("Sure!"))]);
        let extractor = LlmIntentExtractor::new(Arc::new(service));

        let error = extractor.extract("buy a laptop").await.expect_err("no call");
        assert_eq!(error.kind(), ErrorKind::UpstreamParse);
    }

    #[tokio::test]
    async fn missing_credential_is_configuration_error() {
        let extractor =
            LlmIntentExtractor::new(Arc::new(ScriptedCompletionService::without_credential()));
        let error = extractor.extract("buy a laptop").await.expect_err("no key");
        assert!(matches!(error, StageError::Configuration(_)));
    }
}
