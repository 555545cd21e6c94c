use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use property_query::workflows::property_query::{Money, PropertyType};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_money(raw: &str) -> Result<Money, String> {
    match Money::parse(raw) {
        Some(amount) if !amount.is_negative() => Ok(amount),
        Some(_) => Err(format!("rent amount '{raw}' must not be negative")),
        None => Err(format!("failed to parse '{raw}' as a rent amount")),
    }
}

pub(crate) fn parse_property_type(raw: &str) -> Result<PropertyType, String> {
    raw.parse()
}
