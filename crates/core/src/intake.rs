use async_trait::async_trait;

use crate::domain::intent::PurchaseIntent;
use crate::errors::StageError;

/// Turns a free-text purchase goal into a structured intent.
#[async_trait]
pub trait IntentExtractionService: Send + Sync {
    async fn extract(&self, text: &str) -> Result<PurchaseIntent, StageError>;
}
