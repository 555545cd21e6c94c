use std::cmp::Ordering;

use super::domain::{CanonicalListing, FilteredResult, Query, ResultMetadata};

/// Counts gathered before filtering, carried into the result metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub candidates_seen: usize,
    pub malformed_skipped: usize,
    pub duplicates_skipped: usize,
    pub possibly_incomplete: bool,
}

/// Applies the query constraints and orders the survivors.
pub fn filter_and_rank(listings: Vec<CanonicalListing>, query: &Query) -> FilteredResult {
    let intake = IntakeStats {
        candidates_seen: listings.len(),
        ..IntakeStats::default()
    };
    rank_candidates(listings, query, intake)
}

pub(crate) fn rank_candidates(
    listings: Vec<CanonicalListing>,
    query: &Query,
    intake: IntakeStats,
) -> FilteredResult {
    let mut kept: Vec<CanonicalListing> = listings
        .into_iter()
        .filter(|listing| matches_query(listing, query))
        .collect();
    kept.sort_by(compare_listings);

    FilteredResult {
        metadata: ResultMetadata {
            total_candidates_seen: intake.candidates_seen,
            total_after_filter: kept.len(),
            malformed_skipped: intake.malformed_skipped,
            duplicates_skipped: intake.duplicates_skipped,
            possibly_incomplete: intake.possibly_incomplete,
            query_echo: query.clone(),
        },
        listings: kept,
    }
}

fn matches_query(listing: &CanonicalListing, query: &Query) -> bool {
    within_budget(listing, query)
        && query
            .bedrooms
            .map_or(true, |range| range.contains(listing.bedrooms))
        && query
            .property_type
            .map_or(true, |wanted| listing.property_type == Some(wanted))
        && query.move_in_date.map_or(true, |move_in| {
            listing
                .available_date
                .is_some_and(|available| available <= move_in)
        })
        && (!query.vacant_only || listing.is_vacant)
}

/// Unknown rent never satisfies a budget constraint.
fn within_budget(listing: &CanonicalListing, query: &Query) -> bool {
    if !query.is_budget_constrained() {
        return true;
    }
    let Some(rent) = listing.rent_amount else {
        return false;
    };
    query.min_budget.map_or(true, |min| rent >= min) && query.max_budget.map_or(true, |max| rent <= max)
}

/// Rent ascending, then availability date, then id. Unknowns sort last.
pub(crate) fn compare_listings(a: &CanonicalListing, b: &CanonicalListing) -> Ordering {
    known_first(a.rent_amount.as_ref(), b.rent_amount.as_ref())
        .then_with(|| known_first(a.available_date.as_ref(), b.available_date.as_ref()))
        .then_with(|| a.id.cmp(&b.id))
}

fn known_first<T: Ord>(a: Option<&T>, b: Option<&T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
