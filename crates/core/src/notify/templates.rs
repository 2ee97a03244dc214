use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use crate::budget::format_usd;
use crate::errors::StageError;

const HTML_TEMPLATE: &str = "deal_found.html";
const TEXT_TEMPLATE: &str = "deal_found.txt";

#[derive(Clone, Debug, Serialize)]
pub struct DealView<'a> {
    pub product: &'a str,
    pub price: Option<Decimal>,
    pub links: &'a [String],
}

/// Email bodies for a deal notification.
#[derive(Clone, Debug)]
pub struct NotificationTemplates {
    tera: Tera,
}

impl NotificationTemplates {
    pub fn embedded() -> Result<Self, StageError> {
        let mut tera = Tera::default();
        tera.register_filter("money", money_filter);
        tera.add_raw_templates(vec![
            (HTML_TEMPLATE, include_str!("../../templates/notify/deal_found.html.tera")),
            (TEXT_TEMPLATE, include_str!("../../templates/notify/deal_found.txt.tera")),
        ])
        .map_err(|error| StageError::Configuration(format!("invalid email template: {error}")))?;
        Ok(Self { tera })
    }

    pub fn render_html(&self, deal: &DealView<'_>) -> Result<String, StageError> {
        self.render(HTML_TEMPLATE, deal)
    }

    pub fn render_text(&self, deal: &DealView<'_>) -> Result<String, StageError> {
        self.render(TEXT_TEMPLATE, deal)
    }

    fn render(&self, template: &str, deal: &DealView<'_>) -> Result<String, StageError> {
        let context = Context::from_serialize(deal)
            .map_err(|error| StageError::Delivery(format!("template context: {error}")))?;
        self.tera
            .render(template, &context)
            .map_err(|error| StageError::Delivery(format!("failed to render {template}: {error}")))
    }
}

/// `price | money` renders `1,299.00`.
fn money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        tera::Value::String(text) => Decimal::from_str(text).ok(),
        _ => None,
    }
    .unwrap_or_default();
    Ok(tera::Value::String(format_usd(amount)))
}
