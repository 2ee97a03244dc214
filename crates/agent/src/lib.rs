//! HTTP adapters for the dealwatch pipeline.
//!
//! - `llm`: OpenAI-compatible chat completions behind `CompletionService`
//! - `email`: Resend delivery behind `NotificationChannel`
//! - `intent`: free-text goal parsing behind `IntentExtractionService`
//!
//! The model only proposes values. Clamping, cap checks, block-listing and
//! authorization stay in `dealwatch-core`.

pub mod email;
pub mod intent;
pub mod llm;

pub use email::ResendChannel;
pub use intent::LlmIntentExtractor;
pub use llm::OpenAiCompletionService;
