//! Value rendering for flat rows: JSON scalars to text, VND amounts,
//! unit-aware periods and API timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::lookups::PERIOD_UNIT;

/// Collapses runs of whitespace (including newlines) into single spaces
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders any JSON value as a single cell
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => clean_text(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Numeric view of a JSON value; numeric strings are accepted
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

/// Groups the integer part with `.` as Vietnamese documents do
pub fn group_thousands(amount: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let rounded = amount.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if amount < 0.0 && rounded > 0 {
        grouped.insert(0, '-');
    }
    grouped
}

/// `12500000` → `12.500.000 VND`; non-numeric input is kept as text
pub fn format_money(value: &Value) -> String {
    match value_number(value) {
        Some(amount) => format!("{} VND", group_thousands(amount)),
        None => value_text(value),
    }
}

/// `(12, "M")` → `12 tháng`
pub fn format_period(amount: &Value, unit: &Value) -> String {
    let amount = value_text(amount);
    if amount.is_empty() {
        return String::new();
    }
    let unit = value_text(unit);
    if unit.is_empty() {
        amount
    } else {
        format!("{amount} {}", PERIOD_UNIT.translate(&unit))
    }
}

/// API timestamps → `dd/mm/yyyy HH:MM` (or `dd/mm/yyyy` for bare dates).
/// Unparseable input is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.naive_local().format("%d/%m/%Y %H:%M").to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, pattern) {
            return parsed.format("%d/%m/%Y %H:%M").to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%d/%m/%Y").to_string();
    }
    raw.to_string()
}

pub fn format_date_value(value: &Value) -> String {
    format_timestamp(&value_text(value))
}
