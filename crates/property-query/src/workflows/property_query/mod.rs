//! Property availability queries against the listings provider.
//!
//! A query is validated, the provider is paged for candidates, every record is
//! normalized into a [`CanonicalListing`], and the survivors of the budget and
//! attribute filters are returned in rent order.

pub mod domain;
pub mod engine;
mod fields;
pub mod filter;
pub mod normalizer;
pub mod provider;
pub mod reply;
pub mod router;

#[cfg(test)]
mod tests;

pub use domain::{
    BedroomRange, CanonicalListing, Currency, FilteredResult, Money, PropertyType, Query,
    QueryValidationError, ResultMetadata,
};
pub use engine::{
    FailureKind, PropertyQueryEngine, QueryError, QueryFailure, QueryOutcome, QueryStage,
    StageTimings,
};
pub use filter::filter_and_rank;
pub use normalizer::{ConversionTable, ListingNormalizer, MalformedListing, NormalizedBatch};
pub use provider::retry::RetryPolicy;
pub use provider::token::{AccessToken, Credential, TokenCache};
pub use provider::{
    CandidateBatch, CandidateFilter, PageRequest, ProviderClient, ProviderError, ProviderPage,
    ProviderSettings, ProviderTransport, RawListing, RentvineTransport,
};
pub use router::property_query_router;
