//! Short replies a chat or voice agent can read back to the caller.

use super::domain::{CanonicalListing, FilteredResult};

const MAX_LISTED: usize = 5;

pub fn summarize(result: &FilteredResult) -> String {
    let vacant_only = result.metadata.query_echo.vacant_only;
    let line = |listing: &CanonicalListing| {
        if vacant_only {
            listing_line(listing)
        } else {
            format!("{} ({})", listing_line(listing), status(listing))
        }
    };

    match result.listings.as_slice() {
        [] if result.metadata.total_candidates_seen == 0 => {
            "I don't have any property listings available right now.".to_string()
        }
        [] if vacant_only => {
            "I don't have any available properties that match your criteria right now."
                .to_string()
        }
        [] => "I couldn't find any properties matching your search criteria.".to_string(),
        [only] if vacant_only => format!("I found 1 available property: {}.", line(only)),
        [only] => format!("I found 1 property matching your search: {}.", line(only)),
        listings => {
            let mut text = if vacant_only {
                format!(
                    "I found {} available properties. Here are your options:",
                    listings.len()
                )
            } else {
                format!(
                    "I found {} properties matching your search. Here are your options:",
                    listings.len()
                )
            };
            for listing in listings.iter().take(MAX_LISTED) {
                text.push_str("\n• ");
                text.push_str(&line(listing));
            }
            if listings.len() > MAX_LISTED {
                text.push_str(&format!("\n…and {} more.", listings.len() - MAX_LISTED));
            }
            text
        }
    }
}

/// One-sentence details for a single property.
pub fn describe(listing: &CanonicalListing) -> String {
    let mut text = format!(
        "Here are the details for {}: {} bed/{} bath",
        listing.address,
        listing.bedrooms,
        baths(listing.bathrooms)
    );
    if let Some(size) = listing.square_footage {
        text.push_str(&format!(", {size} sq ft"));
    }
    if let Some(rent) = listing.rent_amount {
        text.push_str(&format!(", ${rent}/month"));
    }
    if !listing.is_vacant {
        text.push_str(" (currently occupied)");
    }
    text.push('.');
    text
}

pub fn not_found(address: &str) -> String {
    format!("I couldn't find a property at {address}. Could you double-check the address?")
}

fn listing_line(listing: &CanonicalListing) -> String {
    let rent = listing
        .rent_amount
        .map(|rent| format!("${rent}/month"))
        .unwrap_or_else(|| "rent on request".to_string());
    format!(
        "{} - {} bed/{} bath, {}",
        listing.address,
        listing.bedrooms,
        baths(listing.bathrooms),
        rent
    )
}

fn status(listing: &CanonicalListing) -> &'static str {
    if listing.is_vacant {
        "Available"
    } else {
        "Occupied"
    }
}

fn baths(count: f32) -> String {
    if count.fract() == 0.0 {
        format!("{}", count as u32)
    } else {
        format!("{count:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::property_query::domain::{Currency, Money, Query, ResultMetadata};

    fn listing(address: &str, rent: i64) -> CanonicalListing {
        CanonicalListing {
            id: address.to_string(),
            street: address.to_string(),
            address: address.to_string(),
            city: None,
            state: None,
            postal_code: None,
            rent_amount: Some(Money::from_major(rent)),
            currency: Currency::usd(),
            bedrooms: 2,
            bathrooms: 1.5,
            square_footage: Some(900),
            available_date: None,
            property_type: None,
            is_vacant: true,
            deposit: None,
            year_built: None,
            provider_ref: "test".to_string(),
        }
    }

    fn result(listings: Vec<CanonicalListing>, seen: usize) -> FilteredResult {
        result_for(listings, seen, true)
    }

    fn result_for(listings: Vec<CanonicalListing>, seen: usize, vacant_only: bool) -> FilteredResult {
        FilteredResult {
            metadata: ResultMetadata {
                total_candidates_seen: seen,
                total_after_filter: listings.len(),
                malformed_skipped: 0,
                duplicates_skipped: 0,
                possibly_incomplete: false,
                query_echo: Query {
                    vacant_only,
                    ..Query::default()
                },
            },
            listings,
        }
    }

    #[test]
    fn empty_results_distinguish_no_data_from_no_match() {
        assert!(summarize(&result(Vec::new(), 0)).contains("any property listings"));
        assert!(summarize(&result(Vec::new(), 4)).contains("match your criteria"));
    }

    #[test]
    fn single_and_multiple_results_are_listed() {
        assert_eq!(
            summarize(&result(vec![listing("10 Oak St", 1600)], 1)),
            "I found 1 available property: 10 Oak St - 2 bed/1.5 bath, $1600/month."
        );

        let many: Vec<_> = (0..7).map(|i| listing(&format!("{i} Pine St"), 1000 + i)).collect();
        let text = summarize(&result(many, 7));
        assert!(text.starts_with("I found 7 available properties."));
        assert_eq!(text.matches('•').count(), 5);
        assert!(text.ends_with("…and 2 more."));
    }

    #[test]
    fn unrestricted_queries_label_occupancy() {
        let mut leased = listing("1 Oak St", 1000);
        leased.is_vacant = false;
        assert_eq!(
            summarize(&result_for(vec![leased.clone()], 1, false)),
            "I found 1 property matching your search: 1 Oak St - 2 bed/1.5 bath, $1000/month (Occupied)."
        );

        let text = summarize(&result_for(vec![listing("2 Elm St", 900), leased], 2, false));
        assert!(text.starts_with("I found 2 properties matching your search."));
        assert!(text.contains("2 Elm St - 2 bed/1.5 bath, $900/month (Available)"));
        assert!(!text.contains("available properties"));

        assert_eq!(
            summarize(&result_for(Vec::new(), 3, false)),
            "I couldn't find any properties matching your search criteria."
        );
    }

    #[test]
    fn describe_mentions_size_and_rent() {
        let mut occupied = listing("10 Oak St", 1600);
        occupied.is_vacant = false;
        assert_eq!(
            describe(&occupied),
            "Here are the details for 10 Oak St: 2 bed/1.5 bath, 900 sq ft, $1600/month (currently occupied)."
        );
    }
}
