//! Purchase-deadline normalization and search window sizing.

use std::sync::OnceLock;

use chrono::{Days, Months, NaiveDate};
use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Timeframe {
    Date(NaiveDate),
    Unresolved(String),
}

impl Timeframe {
    /// ISO date when resolved, the original phrase otherwise.
    pub fn render(&self) -> String {
        match self {
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::Unresolved(phrase) => phrase.clone(),
        }
    }
}

pub fn parse_timeframe(input: &str, today: NaiveDate) -> Timeframe {
    let phrase = input.trim();
    let lowered = phrase.to_ascii_lowercase();
    let bare = lowered.strip_prefix("by ").map(str::trim).unwrap_or(&lowered);

    if let Ok(date) = NaiveDate::parse_from_str(bare, "%Y-%m-%d") {
        return Timeframe::Date(date);
    }

    let relative = match bare {
        "today" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        "next week" => today.checked_add_days(Days::new(7)),
        "next month" => today.checked_add_months(Months::new(1)),
        "next year" => today.checked_add_months(Months::new(12)),
        _ => offset_phrase(bare, today),
    };

    match relative {
        Some(date) => Timeframe::Date(date),
        None => Timeframe::Unresolved(phrase.to_owned()),
    }
}

/// Normalizes a phrase to an ISO date string, keeping unresolved phrases verbatim.
pub fn resolve_timeframe(input: &str, today: NaiveDate) -> String {
    parse_timeframe(input, today).render()
}

/// Number of daily search cycles between `today` and the timeframe, at least one.
pub fn cycles_until(timeframe: &str, today: NaiveDate) -> u32 {
    match parse_timeframe(timeframe, today) {
        Timeframe::Date(target) => {
            let days = (target - today).num_days();
            u32::try_from(days).unwrap_or(if days < 0 { 1 } else { u32::MAX }).max(1)
        }
        Timeframe::Unresolved(_) => 1,
    }
}

fn offset_phrase(phrase: &str, today: NaiveDate) -> Option<NaiveDate> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^in\s+(\d{1,4})\s+(day|week|month|year)s?$").ok())
        .as_ref()?;

    let captures = pattern.captures(phrase)?;
    let amount: u32 = captures.get(1)?.as_str().parse().ok()?;
    match captures.get(2)?.as_str() {
        "day" => today.checked_add_days(Days::new(u64::from(amount))),
        "week" => today.checked_add_days(Days::new(u64::from(amount) * 7)),
        "month" => today.checked_add_months(Months::new(amount)),
        "year" => today.checked_add_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{cycles_until, parse_timeframe, resolve_timeframe, Timeframe};

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn relative_phrases_resolve_against_today() {
        let today = day(2025, 7, 1);
        assert_eq!(resolve_timeframe("in 3 months", today), "2025-10-01");
        assert_eq!(resolve_timeframe("In 2 weeks", today), "2025-07-15");
        assert_eq!(resolve_timeframe("in 1 day", today), "2025-07-02");
        assert_eq!(resolve_timeframe("tomorrow", today), "2025-07-02");
        assert_eq!(resolve_timeframe("next year", today), "2026-07-01");
        assert_eq!(resolve_timeframe("by 2025-10-21", today), "2025-10-21");
    }

    #[test]
    fn unknown_phrases_stay_verbatim() {
        let today = day(2025, 7, 1);
        assert_eq!(
            parse_timeframe("before the holidays", today),
            Timeframe::Unresolved("before the holidays".to_owned())
        );
    }

    #[test]
    fn cycle_count_is_whole_days_floored_at_one() {
        let today = day(2025, 7, 1);
        assert_eq!(cycles_until("2025-07-11", today), 10);
        assert_eq!(cycles_until("2025-07-01", today), 1);
        assert_eq!(cycles_until("2024-01-01", today), 1);
        assert_eq!(cycles_until("sometime soon", today), 1);
    }
}
