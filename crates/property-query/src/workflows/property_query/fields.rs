use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// Text value of `key`, accepting strings or numbers. Blank strings and
/// nulls count as absent.
pub(crate) fn text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn date(record: &Value, key: &str) -> Option<NaiveDate> {
    let raw = text(record, key)?;
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|parsed| parsed.date_naive())
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.trim().to_ascii_lowercase())
}
