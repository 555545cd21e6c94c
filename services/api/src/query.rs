use crate::infra::{parse_date, parse_money, parse_property_type};
use chrono::NaiveDate;
use clap::Args;
use property_query::config::AppConfig;
use property_query::error::AppError;
use property_query::workflows::property_query::{
    reply, BedroomRange, Money, PropertyQueryEngine, PropertyType, Query, TokenCache,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct QueryArgs {
    /// City or postal code to search
    #[arg(long)]
    pub(crate) city: Option<String>,
    /// Minimum monthly rent
    #[arg(long, value_parser = parse_money)]
    pub(crate) min_rent: Option<Money>,
    /// Maximum monthly rent
    #[arg(long, value_parser = parse_money)]
    pub(crate) max_rent: Option<Money>,
    /// Bedroom count; exact unless --max-beds is also given
    #[arg(long)]
    pub(crate) beds: Option<u32>,
    /// Upper bound on bedrooms
    #[arg(long)]
    pub(crate) max_beds: Option<u32>,
    /// Property type, e.g. townhouse or condo
    #[arg(long, value_parser = parse_property_type)]
    pub(crate) property_type: Option<PropertyType>,
    /// Latest acceptable availability date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) move_in: Option<NaiveDate>,
    /// Only include units without an active lease
    #[arg(long)]
    pub(crate) vacant_only: bool,
    /// Print the full result as JSON instead of the reply text
    #[arg(long)]
    pub(crate) json: bool,
}

impl QueryArgs {
    pub(crate) fn to_query(&self) -> Query {
        let bedrooms = match (self.beds, self.max_beds) {
            (Some(beds), None) => Some(BedroomRange::exactly(beds)),
            (None, None) => None,
            (min, max) => Some(BedroomRange { min, max }),
        };

        Query {
            location_filter: self.city.clone(),
            min_budget: self.min_rent,
            max_budget: self.max_rent,
            bedrooms,
            property_type: self.property_type,
            move_in_date: self.move_in,
            vacant_only: self.vacant_only,
        }
    }
}

pub(crate) async fn run_query(args: QueryArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = PropertyQueryEngine::rentvine(&config, Arc::new(TokenCache::new()))?;

    let outcome = engine.run_query(args.to_query()).await?;

    if args.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Result payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!("{}", reply::summarize(&outcome.result));
    let metadata = &outcome.result.metadata;
    println!(
        "\n{} of {} listings matched ({} malformed skipped) in {} ms",
        metadata.total_after_filter,
        metadata.total_candidates_seen,
        metadata.malformed_skipped,
        outcome.timings.total_ms()
    );
    if metadata.possibly_incomplete {
        println!("Note: the provider page limit was reached; results may be incomplete.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bed_count_is_exact() {
        let args = QueryArgs {
            beds: Some(2),
            ..QueryArgs::default()
        };
        assert_eq!(args.to_query().bedrooms, Some(BedroomRange::exactly(2)));
    }

    #[test]
    fn bed_bounds_form_a_range() {
        let args = QueryArgs {
            beds: Some(1),
            max_beds: Some(3),
            min_rent: Some(Money::from_major(900)),
            city: Some("Ankeny".into()),
            vacant_only: true,
            ..QueryArgs::default()
        };
        let query = args.to_query();
        assert_eq!(
            query.bedrooms,
            Some(BedroomRange {
                min: Some(1),
                max: Some(3)
            })
        );
        assert_eq!(query.min_budget, Some(Money::from_major(900)));
        assert_eq!(query.location_filter.as_deref(), Some("Ankeny"));
        assert!(query.vacant_only);

        let capped = QueryArgs {
            max_beds: Some(2),
            ..QueryArgs::default()
        };
        assert_eq!(
            capped.to_query().bedrooms,
            Some(BedroomRange {
                min: None,
                max: Some(2)
            })
        );
    }
}
