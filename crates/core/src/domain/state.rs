use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::search::SearchResult;
use crate::errors::DomainError;

/// The single record threaded through every pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub product: String,
    pub timeframe: String,
    pub financials_path: Option<String>,
    pub suggested_budget: Option<Decimal>,
    pub search_result: Option<SearchResult>,
    pub notification_sent: Option<bool>,
}

/// Fields a single stage sets. Merging never replaces an existing value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub suggested_budget: Option<Decimal>,
    pub search_result: Option<SearchResult>,
    pub notification_sent: Option<bool>,
}

impl StateUpdate {
    pub fn budget(value: Decimal) -> Self {
        Self { suggested_budget: Some(value), ..Self::default() }
    }

    pub fn search(result: SearchResult) -> Self {
        Self { search_result: Some(result), ..Self::default() }
    }

    pub fn notification(sent: bool) -> Self {
        Self { notification_sent: Some(sent), ..Self::default() }
    }
}

impl PipelineState {
    pub fn new(
        product: impl Into<String>,
        timeframe: impl Into<String>,
        financials_path: Option<String>,
    ) -> Self {
        Self {
            product: product.into(),
            timeframe: timeframe.into(),
            financials_path,
            suggested_budget: None,
            search_result: None,
            notification_sent: None,
        }
    }

    pub fn validate_intake(&self) -> Result<(), DomainError> {
        if self.product.trim().is_empty() {
            return Err(DomainError::InvariantViolation("product must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Union of `self` with the update's fields.
    pub fn merge(mut self, update: StateUpdate) -> Result<Self, DomainError> {
        if let Some(value) = update.suggested_budget {
            ensure_unset("suggested_budget", self.suggested_budget.is_some())?;
            self.suggested_budget = Some(value);
        }
        if let Some(result) = update.search_result {
            ensure_unset("search_result", self.search_result.is_some())?;
            self.search_result = Some(result);
        }
        if let Some(sent) = update.notification_sent {
            ensure_unset("notification_sent", self.notification_sent.is_some())?;
            self.notification_sent = Some(sent);
        }
        Ok(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn ensure_unset(field: &str, already_set: bool) -> Result<(), DomainError> {
    if already_set {
        return Err(DomainError::InvariantViolation(format!(
            "`{field}` was already set by an earlier stage"
        )));
    }
    Ok(())
}
