use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use super::domain::{CanonicalListing, Currency, Money, PropertyType};
use super::fields;
use super::provider::RawListing;

/// Fixed conversion rates into the working currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTable {
    working: Currency,
    /// Working-currency units per one unit of the keyed currency.
    rates: HashMap<Currency, Decimal>,
}

impl ConversionTable {
    pub fn new(working: Currency) -> Self {
        Self {
            working,
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    pub fn working(&self) -> &Currency {
        &self.working
    }

    /// Working-currency units per unit of `from`, when known.
    pub fn rate(&self, from: &Currency) -> Option<Decimal> {
        if from == &self.working {
            return Some(Decimal::ONE);
        }
        self.rates.get(from).copied()
    }

    /// `None` when no rate is known or the result overflows.
    pub fn convert(&self, amount: Money, from: &Currency) -> Option<Money> {
        self.rate(from).and_then(|rate| amount.convert(rate))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedListing {
    #[error("listing is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("listing field `{field}` could not be parsed from '{value}'")]
    Unparsable { field: &'static str, value: String },
    #[error("listing rent {0} is negative")]
    NegativeRent(Money),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub listings: Vec<CanonicalListing>,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Maps provider records onto [`CanonicalListing`].
#[derive(Debug, Clone)]
pub struct ListingNormalizer {
    rates: ConversionTable,
    /// Currency assumed when a record does not name one.
    provider_currency: Currency,
}

impl ListingNormalizer {
    pub fn new(rates: ConversionTable, provider_currency: Currency) -> Self {
        Self {
            rates,
            provider_currency,
        }
    }

    pub fn normalize(&self, raw: &RawListing) -> Result<CanonicalListing, MalformedListing> {
        match raw {
            RawListing::Rentvine { property, unit } => self.normalize_rentvine(property, unit),
        }
    }

    /// Normalizes a batch, skipping malformed records and repeated ids.
    pub fn normalize_batch(&self, records: &[RawListing]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen = HashSet::new();

        for raw in records {
            match self.normalize(raw) {
                Ok(listing) => {
                    if seen.insert(listing.id.clone()) {
                        batch.listings.push(listing);
                    } else {
                        batch.duplicates += 1;
                    }
                }
                Err(error) => {
                    warn!(provider = raw.provider(), %error, "skipping malformed listing");
                    batch.malformed += 1;
                }
            }
        }

        batch
    }

    fn normalize_rentvine(
        &self,
        property: &Value,
        unit: &Value,
    ) -> Result<CanonicalListing, MalformedListing> {
        let unit_id = fields::text(unit, "unitID").ok_or(MalformedListing::MissingField("unitID"))?;
        let property_id = fields::text(unit, "propertyID")
            .or_else(|| fields::text(property, "propertyID"))
            .unwrap_or_else(|| "unknown".to_string());

        let rent = required_money(unit, "rent")?;
        if rent.is_negative() {
            return Err(MalformedListing::NegativeRent(rent));
        }
        let street = fields::text(unit, "address").ok_or(MalformedListing::MissingField("address"))?;
        let bedrooms = required_count(unit, "beds")?;

        let source_currency = fields::text(unit, "currency")
            .and_then(|code| Currency::parse(&code))
            .unwrap_or_else(|| self.provider_currency.clone());
        let rent_amount = match self.rates.rate(&source_currency) {
            Some(rate) => Some(rent.convert(rate).ok_or_else(|| MalformedListing::Unparsable {
                field: "rent",
                value: rent.to_string(),
            })?),
            None => None,
        };
        let deposit = optional_money(unit, "deposit")
            .filter(|amount| !amount.is_negative())
            .and_then(|amount| self.rates.convert(amount, &source_currency));

        let full_baths = optional_count(unit, "fullBaths").unwrap_or(0);
        let half_baths = optional_count(unit, "halfBaths").unwrap_or(0);

        let address = match fields::text(unit, "address2") {
            Some(line2) => format!("{street} {line2}"),
            None => street.clone(),
        };

        Ok(CanonicalListing {
            id: format!("rentvine-{unit_id}"),
            street,
            address,
            city: fields::text(unit, "city"),
            state: fields::text(unit, "stateID"),
            postal_code: fields::text(unit, "postalCode"),
            rent_amount,
            currency: self.rates.working().clone(),
            bedrooms,
            bathrooms: full_baths as f32 + half_baths as f32 * 0.5,
            square_footage: optional_count(unit, "size").filter(|size| *size > 0),
            available_date: fields::date(unit, "dateAvailable"),
            property_type: fields::text(property, "propertyTypeID")
                .and_then(|id| PropertyType::from_provider_id(&id)),
            is_vacant: fields::text(unit, "leaseID").is_none(),
            deposit,
            year_built: fields::text(property, "yearBuilt").and_then(|year| year.parse().ok()),
            provider_ref: format!("rentvine:property/{property_id}/unit/{unit_id}"),
        })
    }
}

fn required_money(record: &Value, field: &'static str) -> Result<Money, MalformedListing> {
    let raw = fields::text(record, field).ok_or(MalformedListing::MissingField(field))?;
    Money::parse(&raw).ok_or(MalformedListing::Unparsable { field, value: raw })
}

fn optional_money(record: &Value, field: &str) -> Option<Money> {
    fields::text(record, field).and_then(|raw| Money::parse(&raw))
}

fn required_count(record: &Value, field: &'static str) -> Result<u32, MalformedListing> {
    let raw = fields::text(record, field).ok_or(MalformedListing::MissingField(field))?;
    parse_count(&raw).ok_or(MalformedListing::Unparsable { field, value: raw })
}

fn optional_count(record: &Value, field: &str) -> Option<u32> {
    fields::text(record, field).and_then(|raw| parse_count(&raw))
}

/// Whole, non-negative counts; providers sometimes send `"2.0"`.
fn parse_count(raw: &str) -> Option<u32> {
    let value: Decimal = raw.trim().parse().ok()?;
    if value.is_sign_negative() || !value.fract().is_zero() {
        return None;
    }
    value.trunc().to_string().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn normalizer() -> ListingNormalizer {
        let table = ConversionTable::new(Currency::usd()).with_rate(
            Currency::parse("CAD").expect("cad"),
            Decimal::new(75, 2),
        );
        ListingNormalizer::new(table, Currency::usd())
    }

    fn raw(unit: Value) -> RawListing {
        RawListing::Rentvine {
            property: json!({ "propertyID": "12", "propertyTypeID": "4", "yearBuilt": "1998" }),
            unit,
        }
    }

    fn complete_unit() -> Value {
        json!({
            "unitID": "301",
            "propertyID": "12",
            "address": "1200 Grand Ave",
            "address2": "Unit 3",
            "city": "Des Moines",
            "stateID": "IA",
            "postalCode": "50309",
            "rent": "1,650.00",
            "deposit": "1650",
            "beds": "2",
            "fullBaths": "1",
            "halfBaths": "1",
            "size": "940",
            "leaseID": null,
            "dateAvailable": "2025-10-01",
            "marketingNotes": "ignored"
        })
    }

    #[test]
    fn normalizes_a_complete_unit() {
        let listing = normalizer().normalize(&raw(complete_unit())).expect("valid");

        assert_eq!(listing.id, "rentvine-301");
        assert_eq!(listing.street, "1200 Grand Ave");
        assert_eq!(listing.address, "1200 Grand Ave Unit 3");
        assert_eq!(listing.city.as_deref(), Some("Des Moines"));
        assert_eq!(listing.rent_amount, Some(Money::from_major(1650)));
        assert_eq!(listing.currency, Currency::usd());
        assert_eq!(listing.bedrooms, 2);
        assert_eq!(listing.bathrooms, 1.5);
        assert_eq!(listing.square_footage, Some(940));
        assert_eq!(
            listing.available_date,
            NaiveDate::from_ymd_opt(2025, 10, 1)
        );
        assert_eq!(listing.property_type, Some(PropertyType::Townhouse));
        assert!(listing.is_vacant);
        assert_eq!(listing.year_built, Some(1998));
        assert_eq!(listing.provider_ref, "rentvine:property/12/unit/301");
    }

    #[test]
    fn missing_optional_fields_stay_unknown() {
        let listing = normalizer()
            .normalize(&raw(json!({
                "unitID": 7,
                "address": "9 Elm St",
                "rent": 900,
                "beds": 0,
                "size": "",
                "leaseID": "L-1"
            })))
            .expect("valid");

        assert_eq!(listing.square_footage, None);
        assert_eq!(listing.available_date, None);
        assert_eq!(listing.deposit, None);
        assert_eq!(listing.city, None);
        assert!(!listing.is_vacant);
        assert_eq!(listing.bathrooms, 0.0);
    }

    #[test]
    fn converts_foreign_rent_and_marks_unconvertible_rent_unknown() {
        let mut unit = complete_unit();
        unit["currency"] = json!("cad");
        let listing = normalizer().normalize(&raw(unit)).expect("valid");
        assert_eq!(listing.rent_amount, Some(Money::parse("1237.50").expect("amount")));

        let mut unit = complete_unit();
        unit["currency"] = json!("EUR");
        let listing = normalizer().normalize(&raw(unit)).expect("valid");
        assert_eq!(listing.rent_amount, None);
        assert_eq!(listing.currency, Currency::usd());
    }

    #[test]
    fn overflowing_conversion_skips_only_that_record() {
        let mut huge = complete_unit();
        huge["unitID"] = json!("999");
        huge["currency"] = json!("CAD");
        huge["rent"] = json!("79228162514264337593543950335");
        let table = ConversionTable::new(Currency::usd())
            .with_rate(Currency::parse("CAD").expect("cad"), Decimal::TWO);
        let normalizer = ListingNormalizer::new(table, Currency::usd());

        assert!(matches!(
            normalizer.normalize(&raw(huge.clone())),
            Err(MalformedListing::Unparsable { field: "rent", .. })
        ));

        let batch = normalizer.normalize_batch(&[raw(huge), raw(complete_unit())]);
        assert_eq!(batch.listings.len(), 1);
        assert_eq!(batch.malformed, 1);
    }

    #[test]
    fn overflowing_deposit_becomes_unknown() {
        let mut unit = complete_unit();
        unit["currency"] = json!("CAD");
        unit["deposit"] = json!("79228162514264337593543950335");
        let table = ConversionTable::new(Currency::usd())
            .with_rate(Currency::parse("CAD").expect("cad"), Decimal::TWO);
        let listing = ListingNormalizer::new(table, Currency::usd())
            .normalize(&raw(unit))
            .expect("valid");

        assert_eq!(listing.deposit, None);
        assert_eq!(listing.rent_amount, Some(Money::from_major(3300)));
    }

    #[test]
    fn required_fields_are_enforced() {
        for (field, expected) in [
            ("rent", MalformedListing::MissingField("rent")),
            ("address", MalformedListing::MissingField("address")),
            ("beds", MalformedListing::MissingField("beds")),
            ("unitID", MalformedListing::MissingField("unitID")),
        ] {
            let mut unit = complete_unit();
            unit.as_object_mut().expect("object").remove(field);
            assert_eq!(normalizer().normalize(&raw(unit)), Err(expected));
        }

        let mut unit = complete_unit();
        unit["beds"] = json!("two");
        assert!(matches!(
            normalizer().normalize(&raw(unit)),
            Err(MalformedListing::Unparsable { field: "beds", .. })
        ));

        let mut unit = complete_unit();
        unit["rent"] = json!("-5");
        assert!(matches!(
            normalizer().normalize(&raw(unit)),
            Err(MalformedListing::NegativeRent(_))
        ));
    }

    #[test]
    fn normalization_is_deterministic() {
        let record = raw(complete_unit());
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize(&record), normalizer.normalize(&record));
    }

    #[test]
    fn batch_skips_malformed_and_duplicate_records() {
        let mut broken = complete_unit();
        broken["rent"] = json!("call for pricing");
        let mut second = complete_unit();
        second["unitID"] = json!("302");

        let batch = normalizer().normalize_batch(&[
            raw(complete_unit()),
            raw(broken),
            raw(complete_unit()),
            raw(second),
        ]);

        let ids: Vec<_> = batch.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["rentvine-301", "rentvine-302"]);
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.duplicates, 1);
    }

    #[test]
    fn counts_reject_fractions_and_negatives() {
        assert_eq!(parse_count("3"), Some(3));
        assert_eq!(parse_count("2.0"), Some(2));
        assert_eq!(parse_count("1.5"), None);
        assert_eq!(parse_count("-1"), None);
    }
}
