//! Field-level normalization for uploaded campaign spreadsheets.
//!
//! Exported CSVs mix formats freely: ISO and day-first dates, currency
//! symbols and thousands separators in amounts, "N/A" placeholders in the
//! metric columns. Every function here is total — bad input degrades to a
//! default or `None`, never an error, so one messy cell cannot sink a whole
//! upload.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a campaign. Unrecognized or empty input maps to
/// `Planned`, so the mapping is total over arbitrary strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Completed,
    Active,
    Planned,
}

impl CampaignStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "active" => Self::Active,
            _ => Self::Planned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Active => "Active",
            Self::Planned => "Planned",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a date cell. Accepts `YYYY-MM-DD` and `DD/MM/YYYY`; the slash form
/// is split and rebuilt from its parts so day-first input can never be read
/// month-first. Anything else gets a small generic-format fallback.
/// Empty or unparseable input yields `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(d) = parse_slash_date(s) {
        return Some(d);
    }
    for fmt in ["%Y/%m/%d", "%d-%m-%Y", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

fn parse_slash_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('/');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a budget cell like `"$5,000"` into a decimal. Budgets always carry a
/// numeric value: empty or unparseable input yields 0, never `None`.
pub fn parse_budget(raw: &str) -> BigDecimal {
    let s = raw.trim();
    if s.is_empty() {
        return BigDecimal::from(0);
    }
    let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
    BigDecimal::from_str(&cleaned).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Parse an integer metric cell (impressions, clicks, conversions).
/// Empty, blank, or "n/a" in any case means the metric was not reported.
pub fn parse_count(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
        return None;
    }
    s.replace(',', "").parse::<i64>().ok()
}

/// Parse a decimal metric cell (revenue). Same emptiness rules as
/// [`parse_count`], but keeps fractional parts.
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
        return None;
    }
    BigDecimal::from_str(&s.replace(',', "")).ok()
}
