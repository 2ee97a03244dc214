use serde::{Deserialize, Serialize};

/// Structured purchase goal extracted from free text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    pub product: String,
    pub timeframe: String,
    #[serde(default)]
    pub desired_price: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provide_financials: bool,
}

impl PurchaseIntent {
    /// Names of required fields the extractor left blank or unspecified.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.product.trim().is_empty() {
            missing.push("product");
        }
        let timeframe = self.timeframe.trim().to_ascii_lowercase();
        if timeframe.is_empty() || matches!(timeframe.as_str(), "unspecified" | "unknown" | "n/a")
        {
            missing.push("timeframe");
        }
        missing
    }
}
