use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of a single search cycle, or of a whole search once it terminates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    /// A qualifying listing. `price` is `None` only for a link recovered from
    /// plain text, which has not been checked against the cap.
    Found { product_name: String, price: Option<Decimal>, url: String, message: String },
    AboveCap { product_name: String, price: Decimal, cap: Decimal },
    Blocked { product_name: String, price: Decimal, url: String },
    PlainMessage { text: String },
    Error { detail: String },
}

impl SearchResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::AboveCap { .. } => "above_cap",
            Self::Blocked { .. } => "blocked",
            Self::PlainMessage { .. } => "plain_message",
            Self::Error { .. } => "error",
        }
    }

    /// True for a priced listing accepted against the cap.
    pub fn is_verified_match(&self) -> bool {
        matches!(self, Self::Found { price: Some(_), .. })
    }

    pub fn is_unpriced_candidate(&self) -> bool {
        matches!(self, Self::Found { price: None, .. })
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Found { product_name, price: Some(price), url, .. } => {
                format!("found {product_name} for ${price:.2} at {url}")
            }
            Self::Found { product_name, price: None, url, .. } => {
                format!("found unpriced candidate for {product_name} at {url}")
            }
            Self::AboveCap { product_name, price, cap } => {
                format!("{product_name} listed at ${price:.2}, rejected against cap ${cap:.2}")
            }
            Self::Blocked { product_name, url, .. } => {
                format!("{product_name} listing at {url} is on a blocked host")
            }
            Self::PlainMessage { text } => text.clone(),
            Self::Error { detail } => format!("search attempt failed: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::SearchResult;

    #[test]
    fn found_serializes_with_kind_tag_and_float_price() {
        let result = SearchResult::Found {
            product_name: "AirPods (2nd gen)".to_owned(),
            price: Some(Decimal::new(9999, 2)),
            url: "https://www.bestbuy.com/site/airpods".to_owned(),
            message: "Found AirPods (2nd gen) for $99.99".to_owned(),
        };

        let value = serde_json::to_value(&result).unwrap_or_default();
        assert_eq!(value["kind"], json!("found"));
        assert_eq!(value["price"], json!(99.99));
        assert!(result.is_verified_match());
    }

    #[test]
    fn unpriced_found_is_candidate_not_match() {
        let result = SearchResult::Found {
            product_name: "laptop".to_owned(),
            price: None,
            url: "https://example.com/laptop".to_owned(),
            message: "see https://example.com/laptop".to_owned(),
        };

        assert!(!result.is_verified_match());
        assert!(result.is_unpriced_candidate());
        assert!(result.summary().contains("unpriced"));
    }
}
