use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};

use crate::completion::{ChatMessage, CompletionRequest, CompletionService};
use crate::errors::StageError;
use crate::financials::FinancialRecord;

const PRICING_PROMPT: &str = "You are a retail-pricing assistant. When asked for the current \
average retail price of a product, respond with exactly one number (no currency symbols) \
representing the price in USD.";

const PLANNING_PROMPT: &str = "You are a financial-planning assistant.\nGiven the user's last \
three months of income and expenses and their purchase goal, recommend a single dollar amount \
they can comfortably afford. Respond with exactly one number formatted as a dollar value \
(e.g. \"$850\"), with no additional text or explanation.";

/// Recommends a spend for a purchase goal, never above the product's market price.
pub struct BudgetAdvisor {
    completions: Arc<dyn CompletionService>,
    model: Option<String>,
}

impl BudgetAdvisor {
    pub fn new(completions: Arc<dyn CompletionService>) -> Self {
        Self { completions, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub async fn suggest_budget(
        &self,
        product: &str,
        timeframe: &str,
        records: &[FinancialRecord],
    ) -> Result<Decimal, StageError> {
        if !self.completions.has_credential() {
            return Err(StageError::Configuration(
                "no completion service credential is configured".to_owned(),
            ));
        }

        let reference = self.lookup_reference_price(product).await?;
        match reference {
            Some(price) => info!(
                event_name = "budget.reference_price",
                product,
                reference_price = %price,
                "looked up typical retail price"
            ),
            None => warn!(
                event_name = "budget.reference_price_unknown",
                product, "proceeding without a price cap"
            ),
        }

        let financials = serde_json::to_string(records)
            .map_err(|error| StageError::Data(format!("failed to encode financials: {error}")))?;
        let messages = vec![
            ChatMessage::system(planning_prompt(reference)),
            ChatMessage::user(format!(
                "My goal: buy an {product} by {timeframe}.\n\
                 Here are my last three months of finances:\n{financials}"
            )),
        ];

        let reply = self.completions.complete(self.request(messages)).await?;
        let raw = reply.text_or_empty().trim();
        let recommended = parse_currency(raw).ok_or_else(|| {
            StageError::UpstreamParse(format!("expected a dollar amount, got `{raw}`"))
        })?;

        let budget = clamp_to_reference(recommended, reference);
        info!(
            event_name = "budget.suggested",
            product,
            recommended = %recommended,
            suggested_budget = %budget,
            "budget suggested"
        );
        Ok(budget)
    }

    /// Typical retail price for `product`, or `None` when the reply is not a number.
    pub async fn lookup_reference_price(
        &self,
        product: &str,
    ) -> Result<Option<Decimal>, StageError> {
        let messages = vec![
            ChatMessage::system(PRICING_PROMPT),
            ChatMessage::user(format!(
                "What is the current average retail price of an {product} in USD?"
            )),
        ];
        let reply = self.completions.complete(self.request(messages)).await?;
        let price = first_amount(reply.text_or_empty());
        if price.is_none() {
            warn!(
                event_name = "budget.reference_price_unparsed",
                reply = reply.text_or_empty(),
                "could not parse reference price"
            );
        }
        Ok(price)
    }

    fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        let request = CompletionRequest::new(messages);
        match &self.model {
            Some(model) => request.with_model(model.clone()),
            None => request,
        }
    }
}

fn planning_prompt(reference: Option<Decimal>) -> String {
    match reference {
        Some(price) => format!(
            "{PLANNING_PROMPT} Do not recommend more than ${}, the product's typical retail cost.",
            format_usd(price)
        ),
        None => PLANNING_PROMPT.to_owned(),
    }
}

/// Rounds to cents, then caps at the reference floored to cents so the result never exceeds it.
pub fn clamp_to_reference(recommended: Decimal, reference: Option<Decimal>) -> Decimal {
    let recommended = cents(recommended, RoundingStrategy::MidpointAwayFromZero);
    match reference {
        Some(cap) => recommended.min(cents(cap, RoundingStrategy::ToZero)),
        None => recommended,
    }
}

fn cents(amount: Decimal, strategy: RoundingStrategy) -> Decimal {
    let mut cents = amount.round_dp_with_strategy(2, strategy);
    cents.rescale(2);
    cents
}

/// Parses a whole reply such as `$1,299.00` or `850`.
pub fn parse_currency(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|ch| !matches!(ch, '$' | ',')).collect();
    Decimal::from_str(cleaned.trim()).ok()
}

/// First numeric token in free text, ignoring currency symbols and thousands separators.
pub fn first_amount(text: &str) -> Option<Decimal> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = NUMBER
        .get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").ok())
        .as_ref()?;
    let token = pattern.find(text)?.as_str().replace(',', "");
    Decimal::from_str(&token).ok()
}

/// `1234.5` renders as `1,234.50`.
pub fn format_usd(amount: Decimal) -> String {
    let rounded = cents(amount, RoundingStrategy::MidpointAwayFromZero);
    let text = rounded.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{clamp_to_reference, first_amount, format_usd, parse_currency, BudgetAdvisor};
    use crate::completion::{Completion, ScriptedCompletionService};
    use crate::errors::{ErrorKind, StageError};
    use crate::financials::FinancialRecord;

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("decimal literal")
    }

    fn records() -> Vec<FinancialRecord> {
        let row = json!({"month": "2025-05", "income": 5200, "expenses": 3100});
        vec![row.as_object().cloned().expect("object")]
    }

    #[tokio::test]
    async fn recommendation_above_reference_is_clamped() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("800")),
            Ok(Completion::text("$950")),
        ]);
        let advisor = BudgetAdvisor::new(Arc::new(service.clone()));

        let budget = advisor.suggest_budget("iPhone", "2025-10-21", &records()).await;

        assert_eq!(budget, Ok(dec("800.00")));
        assert_eq!(budget.map(|value| value.to_string()), Ok("800.00".to_owned()));
        let requests = service.requests();
        assert_eq!(requests.len(), 2);
        let system = requests[1].messages[0].content.clone().unwrap_or_default();
        assert!(system
            .ends_with("Do not recommend more than $800.00, the product's typical retail cost."));
        let user = requests[1].messages[1].content.clone().unwrap_or_default();
        assert!(user.contains("by 2025-10-21"));
        assert!(user.contains("\"income\":5200"));
    }

    #[tokio::test]
    async fn unknown_reference_passes_recommendation_through() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("it depends on the model")),
            Ok(Completion::text("$1,250")),
        ]);
        let advisor = BudgetAdvisor::new(Arc::new(service.clone()));

        let budget = advisor.suggest_budget("laptop", "in 3 months", &[]).await;

        assert_eq!(budget, Ok(dec("1250")));
        let system = service.requests()[1].messages[0].content.clone().unwrap_or_default();
        assert!(!system.contains("Do not recommend more than"));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_call() {
        let service = ScriptedCompletionService::without_credential();
        let advisor = BudgetAdvisor::new(Arc::new(service.clone()));

        let error = advisor.suggest_budget("iPhone", "2025-10-21", &[]).await;

        assert_eq!(error.map_err(|error| error.kind()), Err(ErrorKind::Configuration));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_recommendation_is_upstream_parse_error() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("999")),
            Ok(Completion::text("about a grand")),
        ]);
        let advisor = BudgetAdvisor::new(Arc::new(service));

        let error = advisor.suggest_budget("iPhone", "2025-10-21", &[]).await;

        assert!(matches!(
            error,
            Err(StageError::UpstreamParse(detail)) if detail.contains("about a grand")
        ));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let service = ScriptedCompletionService::new(vec![Err(StageError::Upstream(
            "connection refused".to_owned(),
        ))]);
        let advisor = BudgetAdvisor::new(Arc::new(service));

        let error = advisor.suggest_budget("iPhone", "2025-10-21", &[]).await;

        assert!(matches!(error, Err(StageError::Upstream(_))));
    }

    #[test]
    fn clamp_never_exceeds_known_reference() {
        for (recommended, reference) in [("950", "800"), ("799.999", "800"), ("12", "11.5")] {
            let result = clamp_to_reference(dec(recommended), Some(dec(reference)));
            assert!(result <= dec(reference), "{recommended} vs {reference}");
        }
        assert_eq!(clamp_to_reference(dec("640.5"), None), dec("640.50"));
    }

    #[test]
    fn sub_cent_reference_is_floored_not_rounded_up() {
        let result = clamp_to_reference(dec("950"), Some(dec("799.995")));
        assert_eq!(result.to_string(), "799.99");
        assert!(result <= dec("799.995"));

        let below = clamp_to_reference(dec("799.994"), Some(dec("799.995")));
        assert_eq!(below.to_string(), "799.99");
    }

    #[tokio::test]
    async fn suggested_budget_stays_under_sub_cent_reference() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("799.995")),
            Ok(Completion::text("$950")),
        ]);
        let advisor = BudgetAdvisor::new(Arc::new(service));

        let budget = advisor.suggest_budget("headphones", "2025-10-21", &[]).await;

        assert_eq!(budget.map(|value| value.to_string()), Ok("799.99".to_owned()));
    }

    #[test]
    fn amounts_parse_from_loose_replies() {
        assert_eq!(parse_currency("$1,299.00"), Some(dec("1299.00")));
        assert_eq!(parse_currency("about $900"), None);
        assert_eq!(first_amount("Roughly $1,099.99 at most stores"), Some(dec("1099.99")));
        assert_eq!(first_amount("no idea"), None);
        assert_eq!(format_usd(dec("1234567.5")), "1,234,567.50");
        assert_eq!(format_usd(dec("800")), "800.00");
    }
}
