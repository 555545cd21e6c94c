use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{CanonicalListing, FilteredResult, Query, QueryValidationError};
use super::fields;
use super::filter::{rank_candidates, IntakeStats};
use super::normalizer::{ConversionTable, ListingNormalizer};
use super::provider::token::TokenCache;
use super::provider::{
    CandidateBatch, ProviderClient, ProviderError, ProviderTransport, RentvineTransport,
};
use crate::config::{AppConfig, ConfigError};

/// Pipeline stages of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Validating,
    Fetching,
    Normalizing,
    Filtering,
    Done,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Validating => "validating",
            QueryStage::Fetching => "fetching",
            QueryStage::Normalizing => "normalizing",
            QueryStage::Filtering => "filtering",
            QueryStage::Done => "done",
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidQuery,
    UpstreamUnavailable,
    ProviderRequestError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidQuery => "invalid_query",
            FailureKind::UpstreamUnavailable => "upstream_unavailable",
            FailureKind::ProviderRequestError => "provider_request_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryValidationError),
    #[error("property listings are temporarily unavailable: {0}")]
    UpstreamUnavailable(ProviderError),
    #[error("{0}")]
    ProviderRequest(ProviderError),
}

impl QueryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            QueryError::InvalidQuery(_) => FailureKind::InvalidQuery,
            QueryError::UpstreamUnavailable(_) => FailureKind::UpstreamUnavailable,
            QueryError::ProviderRequest(_) => FailureKind::ProviderRequestError,
        }
    }
}

impl From<ProviderError> for QueryError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Request { .. } => QueryError::ProviderRequest(error),
            other => QueryError::UpstreamUnavailable(other),
        }
    }
}

/// Terminal failed state: the stage that failed and why.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct QueryFailure {
    pub stage: QueryStage,
    #[source]
    pub error: QueryError,
}

impl QueryFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub validating_ms: u64,
    pub fetching_ms: u64,
    pub normalizing_ms: u64,
    pub filtering_ms: u64,
}

impl StageTimings {
    fn record(&mut self, stage: QueryStage, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match stage {
            QueryStage::Validating => self.validating_ms = ms,
            QueryStage::Fetching => self.fetching_ms = ms,
            QueryStage::Normalizing => self.normalizing_ms = ms,
            QueryStage::Filtering => self.filtering_ms = ms,
            QueryStage::Done => {}
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.validating_ms
            .saturating_add(self.fetching_ms)
            .saturating_add(self.normalizing_ms)
            .saturating_add(self.filtering_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub result: FilteredResult,
    pub timings: StageTimings,
}

/// Per-invocation stage tracker.
struct QueryRun {
    stage: QueryStage,
    started: Instant,
    timings: StageTimings,
}

impl QueryRun {
    fn start() -> Self {
        Self {
            stage: QueryStage::Validating,
            started: Instant::now(),
            timings: StageTimings::default(),
        }
    }

    fn advance(&mut self, next: QueryStage) {
        self.timings.record(self.stage, self.started.elapsed());
        debug!(from = %self.stage, to = %next, "query stage transition");
        self.stage = next;
        self.started = Instant::now();
    }

    fn fail(&self, error: impl Into<QueryError>) -> QueryFailure {
        let failure = QueryFailure {
            stage: self.stage,
            error: error.into(),
        };
        warn!(
            stage = %failure.stage,
            kind = failure.kind().as_str(),
            error = %failure.error,
            "property query failed"
        );
        failure
    }
}

/// Entry point for property queries: validate, fetch, normalize, filter.
pub struct PropertyQueryEngine<T> {
    provider: ProviderClient<T>,
    normalizer: ListingNormalizer,
}

impl PropertyQueryEngine<RentvineTransport> {
    /// Builds an engine wired to the Rentvine API from application config.
    pub fn rentvine(config: &AppConfig, tokens: Arc<TokenCache>) -> Result<Self, ConfigError> {
        let transport = RentvineTransport::from_config(&config.provider)?;
        let provider = ProviderClient::new(transport, tokens, config.provider.settings());
        let normalizer = ListingNormalizer::new(
            config.currency.conversion_table(),
            config.provider.currency.clone(),
        );
        Ok(Self::new(provider, normalizer))
    }
}

impl<T> PropertyQueryEngine<T>
where
    T: ProviderTransport,
{
    pub fn new(provider: ProviderClient<T>, normalizer: ListingNormalizer) -> Self {
        Self {
            provider,
            normalizer,
        }
    }

    pub fn with_rates(provider: ProviderClient<T>, rates: ConversionTable) -> Self {
        let provider_currency = rates.working().clone();
        Self::new(provider, ListingNormalizer::new(rates, provider_currency))
    }

    pub fn provider(&self) -> &ProviderClient<T> {
        &self.provider
    }

    pub async fn run_query(&self, query: Query) -> Result<QueryOutcome, QueryFailure> {
        let mut run = QueryRun::start();
        query.validate().map_err(|err| run.fail(err))?;

        run.advance(QueryStage::Fetching);
        let batch = self
            .provider
            .fetch_candidates(query.location_filter.as_deref(), query.property_type)
            .await
            .map_err(|err| run.fail(err))?;
        let CandidateBatch {
            records,
            pages_fetched,
            possibly_incomplete,
        } = batch;

        run.advance(QueryStage::Normalizing);
        let normalized = self.normalizer.normalize_batch(&records);
        let intake = IntakeStats {
            candidates_seen: records.len(),
            malformed_skipped: normalized.malformed,
            duplicates_skipped: normalized.duplicates,
            possibly_incomplete,
        };

        run.advance(QueryStage::Filtering);
        let result = rank_candidates(normalized.listings, &query, intake);

        run.advance(QueryStage::Done);
        let timings = run.timings;
        info!(
            pages = pages_fetched,
            seen = result.metadata.total_candidates_seen,
            matched = result.metadata.total_after_filter,
            malformed = result.metadata.malformed_skipped,
            incomplete = result.metadata.possibly_incomplete,
            elapsed_ms = timings.total_ms(),
            "property query completed"
        );

        Ok(QueryOutcome { result, timings })
    }

    /// Finds the first listing whose street, display or full address contains,
    /// or is contained in, the search text.
    pub async fn lookup_address(
        &self,
        address: &str,
    ) -> Result<Option<CanonicalListing>, QueryFailure> {
        let mut run = QueryRun::start();
        let needle = address.trim();
        if needle.is_empty() {
            return Err(run.fail(QueryValidationError::MissingAddress));
        }

        run.advance(QueryStage::Fetching);
        let batch = self
            .provider
            .fetch_candidates(None, None)
            .await
            .map_err(|err| run.fail(err))?;

        run.advance(QueryStage::Normalizing);
        let normalized = self.normalizer.normalize_batch(&batch.records);

        run.advance(QueryStage::Filtering);
        let found = normalized
            .listings
            .into_iter()
            .find(|listing| address_matches(listing, needle));

        run.advance(QueryStage::Done);
        info!(found = found.is_some(), "property address lookup completed");
        Ok(found)
    }
}

fn address_matches(listing: &CanonicalListing, needle: &str) -> bool {
    [
        listing.street.clone(),
        listing.address.clone(),
        listing.full_address(),
    ]
    .iter()
    .any(|candidate| {
        fields::contains_ignore_case(candidate, needle)
            || fields::contains_ignore_case(needle, candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_failure_kinds() {
        let unavailable: QueryError = ProviderError::Unavailable("502".into()).into();
        assert_eq!(unavailable.kind(), FailureKind::UpstreamUnavailable);

        let auth: QueryError = ProviderError::Auth { status: 401 }.into();
        assert_eq!(auth.kind(), FailureKind::UpstreamUnavailable);

        let limited: QueryError = ProviderError::RateLimited { retry_after: None }.into();
        assert_eq!(limited.kind(), FailureKind::UpstreamUnavailable);

        let rejected: QueryError = ProviderError::Request {
            status: 422,
            message: "bad".into(),
        }
        .into();
        assert_eq!(rejected.kind(), FailureKind::ProviderRequestError);
    }

    #[test]
    fn timings_record_each_stage() {
        let mut timings = StageTimings::default();
        timings.record(QueryStage::Fetching, Duration::from_millis(40));
        timings.record(QueryStage::Filtering, Duration::from_millis(2));
        timings.record(QueryStage::Done, Duration::from_millis(99));
        assert_eq!(timings.fetching_ms, 40);
        assert_eq!(timings.total_ms(), 42);
    }

    #[test]
    fn failure_display_names_the_stage() {
        let failure = QueryFailure {
            stage: QueryStage::Validating,
            error: QueryError::InvalidQuery(QueryValidationError::MissingAddress),
        };
        assert_eq!(
            failure.to_string(),
            "validating stage failed: invalid query: an address is required to look up property details"
        );
        assert_eq!(failure.kind().as_str(), "invalid_query");
    }
}
