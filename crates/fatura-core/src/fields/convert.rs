//! Value converters applied to captured field text.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::FieldValue;

/// How a captured string becomes a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// Amount with `.`/`,` thousands and decimal separators.
    Monetary,
    /// Day-first date, normalized to `YYYY-MM-DD`.
    Date,
    /// Trimmed text.
    Identity,
}

impl ConverterKind {
    /// Convert a capture; `None` when it cannot be interpreted.
    pub fn apply(self, raw: &str) -> Option<FieldValue> {
        match self {
            ConverterKind::Monetary => parse_amount(raw).map(FieldValue::Amount),
            ConverterKind::Date => parse_date(raw)
                .map(|date| FieldValue::Date(date.format("%Y-%m-%d").to_string())),
            ConverterKind::Identity => {
                let text = raw.trim();
                (!text.is_empty()).then(|| FieldValue::Text(text.to_string()))
            }
        }
    }
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConverterKind::Monetary => write!(f, "monetary"),
            ConverterKind::Date => write!(f, "date"),
            ConverterKind::Identity => write!(f, "identity"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    DayMonthYear,
    YearMonthDay,
}

lazy_static! {
    /// Accepted date layouts, tried in order.
    static ref DATE_FORMATS: Vec<(Regex, DateOrder)> = [
        (r"^(\d{1,2})/(\d{1,2})/(\d{4})$", DateOrder::DayMonthYear),
        (r"^(\d{1,2})/(\d{1,2})/(\d{2})$", DateOrder::DayMonthYear),
        (r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$", DateOrder::DayMonthYear),
        (r"^(\d{1,2})\.(\d{1,2})\.(\d{2})$", DateOrder::DayMonthYear),
        (r"^(\d{1,2})-(\d{1,2})-(\d{4})$", DateOrder::DayMonthYear),
        (r"^(\d{1,2})-(\d{1,2})-(\d{2})$", DateOrder::DayMonthYear),
        (r"^(\d{4})-(\d{1,2})-(\d{1,2})$", DateOrder::YearMonthDay),
    ]
    .into_iter()
    .map(|(pattern, order)| (Regex::new(pattern).unwrap(), order))
    .collect();
}

/// Parse a monetary amount.
///
/// Only digits and separators are kept, and trailing separators dropped.
/// With a comma present, dots group thousands and the comma is decimal
/// (`1.234,56`). Without one, a lone dot is decimal (`45.00`); with several
/// dots the last one is decimal only when followed by one or two digits
/// (`1.234.56`), otherwise they all group thousands (`1.234.567`).
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let cleaned = kept.trim_end_matches([',', '.']);
    if !cleaned.contains(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.matches('.').count() > 1 {
        match cleaned.rsplit_once('.') {
            Some((head, tail)) if tail.len() <= 2 => format!("{}.{}", head.replace('.', ""), tail),
            _ => cleaned.replace('.', ""),
        }
    } else {
        cleaned.to_string()
    };

    // ",99" and ".50" have no integer part.
    match normalized.strip_prefix('.') {
        Some(fraction) => Decimal::from_str(&format!("0.{}", fraction)).ok(),
        None => Decimal::from_str(&normalized).ok(),
    }
}

/// Parse a date in one of the accepted layouts, ignoring whitespace.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().find_map(|(regex, order)| {
        let caps = regex.captures(&compact)?;
        let (year, month, day) = match order {
            DateOrder::DayMonthYear => (&caps[3], &caps[2], &caps[1]),
            DateOrder::YearMonthDay => (&caps[1], &caps[2], &caps[3]),
        };
        NaiveDate::from_ymd_opt(parse_year(year)?, month.parse().ok()?, day.parse().ok()?)
    })
}

/// Four-digit years as-is; two-digit years pivot at 69 (`68` → 2068, `69` → 1969).
fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(match (s.len(), year) {
        (2, 0..=68) => 2000 + year,
        (2, _) => 1900 + year,
        _ => year,
    })
}
