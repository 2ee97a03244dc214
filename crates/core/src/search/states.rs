use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::completion::CapabilitySpec;
use crate::domain::search::SearchResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Searching { cycle: u32, max_cycles: u32 },
    Found,
    Exhausted,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Found | Self::Exhausted)
    }
}

/// The closed set of capabilities the search loop acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchCapability {
    RecordProductFound,
}

impl SearchCapability {
    pub const ALL: [Self; 1] = [Self::RecordProductFound];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RecordProductFound => "record_product_found",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| capability.name() == name)
    }

    pub fn spec(&self) -> CapabilitySpec {
        match self {
            Self::RecordProductFound => CapabilitySpec {
                name: self.name().to_owned(),
                description: "Records details of a product found during a web search that \
                              meets the specified criteria."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "product_name": {
                            "type": "string",
                            "description": "The exact name of the product found, e.g., 'Sony WH-1000XM5 headphones'."
                        },
                        "price": {
                            "type": "number",
                            "description": "The numeric price of the product found, e.g., 299.99."
                        },
                        "url": {
                            "type": "string",
                            "description": "The URL of the product listing."
                        }
                    },
                    "required": ["product_name", "price", "url"]
                }),
            },
        }
    }
}

/// Arguments of a `record_product_found` invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProductFoundArgs {
    #[serde(default)]
    pub product_name: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub product_name: String,
    /// Inclusive upper bound on an accepted listing price.
    pub price_cap: Decimal,
    pub max_cycles: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub state: SearchState,
    pub attempts: u32,
    pub result: SearchResult,
    pub history: Vec<SearchResult>,
}
