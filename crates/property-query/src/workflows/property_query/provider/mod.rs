//! Listings provider access: credentials, retry and pagination.
//!
//! The wire protocol for a specific provider sits behind [`ProviderTransport`];
//! [`ProviderClient`] layers token caching, bounded retries, per-call timeouts
//! and page walking on top of whichever transport it is given.

pub mod rentvine;
pub mod retry;
pub mod token;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::domain::PropertyType;
use retry::{RetryDecision, RetryPolicy, RetryState};
use token::{AccessToken, TokenCache};

pub use rentvine::RentvineTransport;

/// Provider-shaped record handed untouched to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawListing {
    Rentvine { property: Value, unit: Value },
}

impl RawListing {
    pub fn provider(&self) -> &'static str {
        match self {
            RawListing::Rentvine { .. } => "rentvine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("listings provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },
    #[error("listings provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("listings provider unavailable: {0}")]
    Unavailable(String),
    #[error("listings provider did not answer within {after:?}")]
    Timeout { after: Duration },
    #[error("listings provider rejected the request (HTTP {status}): {message}")]
    Request { status: u16, message: String },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Unavailable(_)
                | ProviderError::Timeout { .. }
        )
    }
}

/// Hints a transport may use to narrow what it returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub filter: &'a CandidateFilter,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPage {
    pub records: Vec<RawListing>,
    pub has_more: bool,
}

/// Provider-specific wire protocol.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn authenticate(&self) -> Result<AccessToken, ProviderError>;

    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<ProviderPage, ProviderError>;

    /// True when the transport applies the request timeout to each of the
    /// network calls behind one page. The client then leaves `fetch_page`
    /// unbounded instead of timing the whole page as one call.
    fn bounds_each_call(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSettings {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub page_size: u32,
    /// Safety ceiling on pages walked per query.
    pub max_pages: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
            page_size: 50,
            max_pages: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateBatch {
    pub records: Vec<RawListing>,
    pub pages_fetched: u32,
    /// Set when the page ceiling stopped pagination early.
    pub possibly_incomplete: bool,
}

pub struct ProviderClient<T> {
    transport: T,
    tokens: Arc<TokenCache>,
    settings: ProviderSettings,
}

impl<T> ProviderClient<T>
where
    T: ProviderTransport,
{
    pub fn new(transport: T, tokens: Arc<TokenCache>, settings: ProviderSettings) -> Self {
        Self {
            transport,
            tokens,
            settings,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Walks every provider page for the given hints.
    pub async fn fetch_candidates(
        &self,
        location_filter: Option<&str>,
        property_type: Option<PropertyType>,
    ) -> Result<CandidateBatch, ProviderError> {
        let filter = CandidateFilter {
            location: location_filter
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            property_type,
        };

        let mut batch = CandidateBatch::default();
        let mut page = 1;
        loop {
            let fetched = self.fetch_page_with_retry(&filter, page).await?;
            batch.pages_fetched = page;
            debug!(page, records = fetched.records.len(), "provider page fetched");
            batch.records.extend(fetched.records);

            if !fetched.has_more {
                break;
            }
            if page >= self.settings.max_pages {
                warn!(
                    max_pages = self.settings.max_pages,
                    records = batch.records.len(),
                    "provider page ceiling reached; results may be incomplete"
                );
                batch.possibly_incomplete = true;
                break;
            }
            page += 1;
        }

        Ok(batch)
    }

    async fn fetch_page_with_retry(
        &self,
        filter: &CandidateFilter,
        page: u32,
    ) -> Result<ProviderPage, ProviderError> {
        let mut state = RetryState::new(self.settings.retry);
        let request = PageRequest {
            filter,
            page,
            page_size: self.settings.page_size,
        };

        loop {
            let attempt = state.begin_attempt();
            let (token, outcome) = match self
                .tokens
                .get_or_refresh(|| self.bounded(self.transport.authenticate()))
                .await
            {
                Ok(token) => {
                    let fetch = self.transport.fetch_page(&token, request);
                    let outcome = if self.transport.bounds_each_call() {
                        fetch.await
                    } else {
                        self.bounded(fetch).await
                    };
                    (Some(token), outcome)
                }
                Err(err) => (None, Err(err)),
            };

            let error = match outcome {
                Ok(fetched) => return Ok(fetched),
                Err(error) => error,
            };

            match state.on_failure(error.clone()) {
                RetryDecision::GiveUp(error) => {
                    warn!(page, attempt, %error, "provider request failed");
                    return Err(error);
                }
                RetryDecision::Retry {
                    delay,
                    refresh_credentials,
                } => {
                    warn!(
                        page,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying provider request"
                    );
                    if refresh_credentials {
                        if let Some(token) = token.as_ref() {
                            self.tokens.invalidate(token).await;
                        }
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn bounded<F, R>(&self, call: F) -> Result<R, ProviderError>
    where
        F: Future<Output = Result<R, ProviderError>>,
    {
        let after = self.settings.request_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { after }),
        }
    }
}
