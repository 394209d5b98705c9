// src/verification/amount.rs
//! Best-guess extraction of the paid amount from OCR'd receipt text.
//!
//! OCR output is noisy: dates, times, phone numbers, session ids and the
//! payment reference all look like numbers. The extractor runs an ordered
//! chain of strategies and the first one that yields a plausible value wins.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Smallest amount a receipt can plausibly carry.
pub const MIN_PLAUSIBLE_AMOUNT: f64 = 50.0;
/// Largest amount a receipt can plausibly carry.
pub const MAX_PLAUSIBLE_AMOUNT: f64 = 1_000_000.0;

/// Header strategy only looks at the top of the receipt
const HEADER_LINES: usize = 5;
/// Lines scanned above a "successful"/"transaction" marker
const CONTEXT_LINES: usize = 2;

/// Which strategy produced an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountStrategy {
    DecimalMoney,
    StandaloneLine,
    NearStatus,
    GlobalCandidate,
    HeaderLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmountMatch {
    pub value: f64,
    pub strategy: AmountStrategy,
}

/// Amount extractor with pre-compiled patterns.
///
/// Build once and share; extraction takes `&self` and never panics.
/// Unless pinned, the years treated as dates follow the clock at each call.
#[derive(Debug, Clone)]
pub struct AmountExtractor {
    decimal_money: Regex,
    numeric_token: Regex,
    standalone_line: Regex,
    header_line: Regex,
    month_name: Regex,
    year_token: Regex,
    reference_year: Option<i32>,
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AmountExtractor {
    /// Extractor whose "known years" are derived from the date of each extraction
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Extractor that always treats `year - 1`, `year` and `year + 1` as dates
    pub fn with_reference_year(year: i32) -> Self {
        Self::build(Some(year))
    }

    fn build(reference_year: Option<i32>) -> Self {
        // Patterns are literals; a failure here is a programming error.
        let compile = |pattern: &str| Regex::new(pattern).expect("amount pattern must compile");

        Self {
            decimal_money: compile(r"(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\b"),
            // OCR often renders the naira sign as a bare "N" glued to the digits.
            numeric_token: compile(
                r"(?:^|[^\w,.]|\bN)((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?)\b",
            ),
            standalone_line: compile(r"^\s*([\d,]+)\s*$"),
            header_line: compile(r"^\s*((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?)\s*$"),
            month_name: compile(
                r"(?i)\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b",
            ),
            year_token: compile(r"\b(\d{4})\b"),
            reference_year,
        }
    }

    /// Years around the pinned reference year, or around `now` when unpinned
    fn known_years_at(&self, now: DateTime<Utc>) -> [i32; 3] {
        let year = self.reference_year.unwrap_or_else(|| now.year());
        [year - 1, year, year + 1]
    }

    /// Returns the best amount candidate, or `None` when nothing plausible is found.
    pub fn extract_amount(&self, text: &str, expected: Option<f64>) -> Option<f64> {
        self.extract(text, expected).map(|found| found.value)
    }

    /// Like [`extract_amount`](Self::extract_amount) but also reports the winning strategy.
    pub fn extract(&self, text: &str, expected: Option<f64>) -> Option<AmountMatch> {
        if text.trim().is_empty() {
            return None;
        }

        let lines: Vec<&str> = text.lines().collect();
        let expected = expected.filter(|value| value.is_finite());
        let years = self.known_years_at(Utc::now());

        let found = self
            .decimal_money_scan(&lines, &years)
            .map(|value| (value, AmountStrategy::DecimalMoney))
            .or_else(|| {
                self.standalone_line_scan(&lines, &years)
                    .map(|value| (value, AmountStrategy::StandaloneLine))
            })
            .or_else(|| {
                self.near_status_scan(&lines, &years)
                    .map(|value| (value, AmountStrategy::NearStatus))
            })
            .or_else(|| {
                self.global_candidate_scan(text, expected, &years)
                    .map(|value| (value, AmountStrategy::GlobalCandidate))
            })
            .or_else(|| {
                self.header_line_scan(&lines, &years)
                    .map(|value| (value, AmountStrategy::HeaderLine))
            })
            .map(|(value, strategy)| AmountMatch { value, strategy });

        match &found {
            Some(found) => debug!(
                value = found.value,
                strategy = ?found.strategy,
                "Amount extracted from receipt text"
            ),
            None => debug!(lines = lines.len(), "No plausible amount in receipt text"),
        }

        found
    }

    fn decimal_money_scan(&self, lines: &[&str], years: &[i32; 3]) -> Option<f64> {
        lines
            .iter()
            .filter(|line| !self.looks_like_date(line, years))
            .flat_map(|line| self.decimal_money.find_iter(line))
            .filter_map(|token| parse_amount(token.as_str()))
            .find(|value| is_candidate(*value, years))
    }

    fn standalone_line_scan(&self, lines: &[&str], years: &[i32; 3]) -> Option<f64> {
        lines
            .iter()
            .filter(|line| !self.looks_like_date(line, years))
            .filter_map(|line| self.standalone_line.captures(line))
            .filter_map(|caps| caps.get(1).and_then(|token| parse_amount(token.as_str())))
            .find(|value| is_candidate(*value, years))
    }

    /// Amounts must start at a word boundary; digits glued to letters are ids.
    fn near_status_scan(&self, lines: &[&str], years: &[i32; 3]) -> Option<f64> {
        for (index, line) in lines.iter().enumerate() {
            let lowered = line.to_lowercase();
            if !lowered.contains("successful") && !lowered.contains("transaction") {
                continue;
            }

            let start = index.saturating_sub(CONTEXT_LINES);
            let found = lines[start..index]
                .iter()
                .flat_map(|previous| self.numeric_token.captures_iter(previous))
                .filter_map(|caps| caps.get(1).and_then(|token| parse_amount(token.as_str())))
                .find(|value| is_candidate(*value, years));

            if found.is_some() {
                return found;
            }
        }

        None
    }

    fn global_candidate_scan(
        &self,
        text: &str,
        expected: Option<f64>,
        years: &[i32; 3],
    ) -> Option<f64> {
        let candidates: Vec<f64> = self
            .numeric_token
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter(|token| !is_phone_shaped(token.as_str()))
            .filter_map(|token| parse_amount(token.as_str()))
            .filter(|value| is_candidate(*value, years))
            .collect();

        match expected {
            Some(target) => candidates
                .into_iter()
                .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs())),
            None => candidates.into_iter().max_by(|a, b| a.total_cmp(b)),
        }
    }

    fn header_line_scan(&self, lines: &[&str], years: &[i32; 3]) -> Option<f64> {
        lines
            .iter()
            .take(HEADER_LINES)
            .filter_map(|line| self.header_line.captures(line))
            .filter_map(|caps| caps.get(1).and_then(|token| parse_amount(token.as_str())))
            .find(|value| is_candidate(*value, years))
    }

    /// A line mentioning a month name or a nearby calendar year is a date line.
    fn looks_like_date(&self, line: &str, years: &[i32; 3]) -> bool {
        if self.month_name.is_match(line) {
            return true;
        }

        self.year_token.captures_iter(line).any(|caps| {
            caps.get(1)
                .and_then(|year| year.as_str().parse::<i32>().ok())
                .map(|year| years.contains(&year))
                .unwrap_or(false)
        })
    }
}

/// Plausible and not one of the years treated as dates
fn is_candidate(value: f64, years: &[i32; 3]) -> bool {
    is_plausible(value) && !years.iter().any(|year| value == f64::from(*year))
}

/// True when `value` lies inside the plausibility window
pub fn is_plausible(value: f64) -> bool {
    (MIN_PLAUSIBLE_AMOUNT..=MAX_PLAUSIBLE_AMOUNT).contains(&value)
}

/// Strips grouping separators and parses the remainder as a float.
fn parse_amount(token: &str) -> Option<f64> {
    token
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Ungrouped digit runs of phone length, or with a leading zero, are never amounts.
fn is_phone_shaped(token: &str) -> bool {
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    token.len() >= 7 || (token.starts_with('0') && token.len() >= 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> AmountExtractor {
        AmountExtractor::with_reference_year(2025)
    }

    /// Formats whole currency units plus cents with thousands separators.
    fn grouped(units: u64, cents: u64) -> String {
        let digits = units.to_string();
        let mut out = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        format!("{}.{:02}", out, cents)
    }

    #[test]
    fn test_decimal_money_in_noise() {
        let cases = [
            (50, 0),
            (99, 99),
            (1_000, 50),
            (2_000, 0),
            (12_345, 67),
            (450_000, 10),
            (999_999, 99),
            (1_000_000, 0),
        ];

        for (units, cents) in cases {
            let token = grouped(units, cents);
            let text = format!(
                "OPay\nTransfer to JOHN DOE\nOct 14th, 2025 10:32:11\n\u{20a6}{}\nSession ID 08012345678\nREF tmzbrand482913",
                token
            );
            let expected = units as f64 + cents as f64 / 100.0;
            let found = extractor().extract(&text, None).unwrap();
            assert!(
                (found.value - expected).abs() < 0.01,
                "{} extracted as {}",
                token,
                found.value
            );
            assert_eq!(found.strategy, AmountStrategy::DecimalMoney);
        }
    }

    #[test]
    fn test_out_of_window_values_are_never_returned() {
        for lone in ["4", "2025", "8079304530"] {
            assert_eq!(extractor().extract_amount(lone, None), None, "{}", lone);
            assert_eq!(extractor().extract_amount(lone, Some(2000.0)), None, "{}", lone);
        }
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(extractor().extract_amount("", None), None);
        assert_eq!(extractor().extract_amount("   \n\t", Some(2000.0)), None);
    }

    #[test]
    fn test_date_lines_are_skipped() {
        let text = "Date: 14 Oct 2025 1,200.00\nAmount\n2,000.00";
        assert_eq!(extractor().extract_amount(text, None), Some(2000.0));
    }

    #[test]
    fn test_standalone_integer_line() {
        let text = "Transfer Receipt\nAmount\n5,000\nRecipient JOHN DOE";
        let found = extractor().extract(text, None).unwrap();
        assert_eq!(found.value, 5000.0);
        assert_eq!(found.strategy, AmountStrategy::StandaloneLine);
    }

    #[test]
    fn test_standalone_year_line_is_ignored() {
        let text = "2025\nAmount N3,000 paid";
        let found = extractor().extract(text, None).unwrap();
        assert_eq!(found.value, 3000.0);
        assert_eq!(found.strategy, AmountStrategy::GlobalCandidate);
    }

    #[test]
    fn test_amount_near_status_line() {
        let text = "Paid N2500 to JOHN\nTransfer Successful";
        let found = extractor().extract(text, None).unwrap();
        assert_eq!(found.value, 2500.0);
        assert_eq!(found.strategy, AmountStrategy::NearStatus);
    }

    #[test]
    fn test_global_candidates_prefer_expected() {
        let text = "Fee 150 charged\nTotal N2000 debit\nBalance N9500 left";
        let found = extractor().extract(text, Some(2000.0)).unwrap();
        assert_eq!(found.value, 2000.0);
        assert_eq!(found.strategy, AmountStrategy::GlobalCandidate);

        assert_eq!(extractor().extract_amount(text, None), Some(9500.0));
    }

    #[test]
    fn test_global_candidates_tie_keeps_first() {
        let text = "Was N1900 now N2100 here";
        assert_eq!(extractor().extract_amount(text, Some(2000.0)), Some(1900.0));
    }

    #[test]
    fn test_phone_numbers_and_references_are_ignored() {
        let text = "Phone 08035551234\nRef tmzbrand123456\nTo JOHN 0815";
        assert_eq!(extractor().extract_amount(text, Some(2000.0)), None);
    }

    #[test]
    fn test_header_line_scan_only_reads_top_lines() {
        let years = [2024, 2025, 2026];
        let top = ["2,000.5", "JOHN DOE", "OPay"];
        assert_eq!(extractor().header_line_scan(&top, &years), Some(2000.5));

        let deep = ["OPay", "Receipt", "JOHN DOE", "Transfer", "Details", "2,000.5"];
        assert_eq!(extractor().header_line_scan(&deep, &years), None);
    }

    #[test]
    fn test_digits_glued_to_letters_are_not_near_status_amounts() {
        let lines = ["Ref tmzbrand123456", "Transaction Successful"];
        assert_eq!(extractor().near_status_scan(&lines, &[2024, 2025, 2026]), None);
        assert_eq!(extractor().extract_amount(&lines.join("\n"), None), None);

        let lines = ["Amount: 2,500.5", "Transaction Successful"];
        assert_eq!(
            extractor().near_status_scan(&lines, &[2024, 2025, 2026]),
            Some(2500.5)
        );
    }

    #[test]
    fn test_known_years_follow_the_clock_unless_pinned() {
        let new_years_eve = "2025-12-31T23:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let new_years_day = "2026-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap();

        let live = AmountExtractor::new();
        assert_eq!(live.known_years_at(new_years_eve), [2024, 2025, 2026]);
        assert_eq!(live.known_years_at(new_years_day), [2025, 2026, 2027]);

        let pinned = extractor();
        assert_eq!(pinned.known_years_at(new_years_day), [2024, 2025, 2026]);
    }

    #[test]
    fn test_is_phone_shaped() {
        assert!(is_phone_shaped("08012345678"));
        assert!(is_phone_shaped("0803"));
        assert!(is_phone_shaped("8079304530"));
        assert!(!is_phone_shaped("2000"));
        assert!(!is_phone_shaped("1,000,000"));
    }
}
