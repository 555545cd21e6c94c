use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Monetary amount rounded to cents. Serialized as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Parses provider-style amounts such as `"1,250.00"` or `"$980"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| *c != ',' && *c != '$')
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        Decimal::from_str(&cleaned).ok().map(Self::new)
    }

    /// `None` when the converted amount does not fit a decimal.
    pub fn convert(&self, rate: Decimal) -> Option<Self> {
        self.0.checked_mul(rate).map(Self::new)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract().is_zero() {
            write!(f, "{}", self.0.trunc())
        } else {
            write!(f, "{:.2}", self.0)
        }
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.to_f64().unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a monetary amount as a number or numeric string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Money, E> {
        Ok(Money::from_major(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Money, E> {
        Ok(Money::new(Decimal::from(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Money, E> {
        Decimal::from_f64(value)
            .map(Money::new)
            .ok_or_else(|| E::custom(format!("amount {value} is out of range")))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Money, E> {
        Money::parse(value).ok_or_else(|| E::custom(format!("'{value}' is not an amount")))
    }
}

/// ISO-4217 currency code, always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    SingleFamilyHome,
    Duplex,
    CondoApartment,
    Townhouse,
    MultiFamily,
}

impl PropertyType {
    /// Maps the listings provider's numeric property type identifiers.
    pub fn from_provider_id(id: &str) -> Option<Self> {
        match id.trim() {
            "1" => Some(Self::SingleFamilyHome),
            "2" => Some(Self::Duplex),
            "3" => Some(Self::CondoApartment),
            "4" => Some(Self::Townhouse),
            "5" => Some(Self::MultiFamily),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleFamilyHome => "Single Family Home",
            Self::Duplex => "Duplex",
            Self::CondoApartment => "Condo/Apartment",
            Self::Townhouse => "Townhouse",
            Self::MultiFamily => "Multi-Family",
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' ', '/'], "_").as_str() {
            "single_family_home" | "single_family" | "house" => Ok(Self::SingleFamilyHome),
            "duplex" => Ok(Self::Duplex),
            "condo_apartment" | "condo" | "apartment" => Ok(Self::CondoApartment),
            "townhouse" => Ok(Self::Townhouse),
            "multi_family" => Ok(Self::MultiFamily),
            other => Err(format!("unknown property type '{other}'")),
        }
    }
}

/// Inclusive bedroom bounds; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BedroomRange {
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

impl BedroomRange {
    pub fn exactly(count: u32) -> Self {
        Self {
            min: Some(count),
            max: Some(count),
        }
    }

    pub fn at_least(count: u32) -> Self {
        Self {
            min: Some(count),
            max: None,
        }
    }

    pub fn contains(&self, bedrooms: u32) -> bool {
        self.min.map_or(true, |min| bedrooms >= min) && self.max.map_or(true, |max| bedrooms <= max)
    }
}

/// Structured search criteria extracted by the calling agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub location_filter: Option<String>,
    #[serde(default)]
    pub min_budget: Option<Money>,
    #[serde(default)]
    pub max_budget: Option<Money>,
    #[serde(default)]
    pub bedrooms: Option<BedroomRange>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub vacant_only: bool,
}

impl Query {
    pub fn is_budget_constrained(&self) -> bool {
        self.min_budget.is_some() || self.max_budget.is_some()
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        for (field, budget) in [("min_budget", self.min_budget), ("max_budget", self.max_budget)] {
            if let Some(value) = budget {
                if value.is_negative() {
                    return Err(QueryValidationError::NegativeBudget { field, value });
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_budget, self.max_budget) {
            if min > max {
                return Err(QueryValidationError::BudgetInverted { min, max });
            }
        }

        if let Some(BedroomRange {
            min: Some(min),
            max: Some(max),
        }) = self.bedrooms
        {
            if min > max {
                return Err(QueryValidationError::BedroomsInverted { min, max });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryValidationError {
    #[error("{field} must not be negative (got {value})")]
    NegativeBudget { field: &'static str, value: Money },
    #[error("min_budget {min} is greater than max_budget {max}")]
    BudgetInverted { min: Money, max: Money },
    #[error("minimum bedrooms {min} is greater than maximum bedrooms {max}")]
    BedroomsInverted { min: u32, max: u32 },
    #[error("an address is required to look up property details")]
    MissingAddress,
}

/// Normalized rental unit. `None` fields are unknown, never defaulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalListing {
    pub id: String,
    /// Street line as reported, without unit designators.
    pub street: String,
    /// Street plus any second address line.
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    /// Rent in the working currency; unknown when no conversion rate applied.
    pub rent_amount: Option<Money>,
    pub currency: Currency,
    pub bedrooms: u32,
    pub bathrooms: f32,
    pub square_footage: Option<u32>,
    pub available_date: Option<NaiveDate>,
    pub property_type: Option<PropertyType>,
    pub is_vacant: bool,
    pub deposit: Option<Money>,
    pub year_built: Option<u16>,
    pub provider_ref: String,
}

impl CanonicalListing {
    /// Street, city, state and postal code on one line; unknown parts omitted.
    pub fn full_address(&self) -> String {
        let mut line = self.street.clone();
        let region = [self.state.as_deref(), self.postal_code.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        for part in [self.city.as_deref().unwrap_or_default(), region.as_str()] {
            if !part.is_empty() {
                line.push_str(", ");
                line.push_str(part);
            }
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub total_candidates_seen: usize,
    pub total_after_filter: usize,
    pub malformed_skipped: usize,
    pub duplicates_skipped: usize,
    pub possibly_incomplete: bool,
    pub query_echo: Query,
}

/// Ranked listings for a single query. Built once and handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredResult {
    pub listings: Vec<CanonicalListing>,
    pub metadata: ResultMetadata,
}

impl FilteredResult {
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
