use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, warn};

use super::token::{AccessToken, Credential};
use super::{
    CandidateFilter, PageRequest, ProviderError, ProviderPage, ProviderTransport, RawListing,
};
use crate::config::{ConfigError, ProviderConfig};
use crate::workflows::property_query::domain::PropertyType;
use crate::workflows::property_query::fields;

const USER_AGENT: &str = concat!("property-query/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 200;
/// Unit lists requested at once while expanding a page of properties.
const UNIT_FETCH_CONCURRENCY: usize = 8;

/// Rentvine manager API adapter.
///
/// Rentvine authenticates every call with the account's API key and secret
/// over HTTP basic auth. Units are listed per property, so one page here is a
/// page of properties expanded into their units, and every HTTP call is
/// bounded by the request timeout on its own.
pub struct RentvineTransport {
    http: reqwest::Client,
    base_url: String,
    call_timeout: Duration,
    api_key: String,
    api_secret: String,
}

impl RentvineTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let (api_key, api_secret) = config.credentials()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            call_timeout: config.request_timeout,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    async fn get_list(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>, ProviderError> {
        let after = self.call_timeout;
        match tokio::time::timeout(after, self.send_list(token, path, query)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { after }),
        }
    }

    async fn send_list(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let request = authorize(self.http.get(&url).query(query), token);
        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        response.json::<Vec<Value>>().await.map_err(|err| {
            if err.is_timeout() {
                self.transport_error(err)
            } else {
                ProviderError::Unavailable(format!("unreadable response from {path}: {err}"))
            }
        })
    }

    /// Units of one property, narrowed by the location hint.
    async fn property_units(
        &self,
        token: &AccessToken,
        filter: &CandidateFilter,
        property_id: String,
        property: Value,
    ) -> Result<Vec<RawListing>, ProviderError> {
        let units = self
            .get_list(token, &format!("/properties/{property_id}/units"), &[])
            .await?;

        Ok(units
            .into_iter()
            .map(|item| unwrap_envelope(item, "unit"))
            .filter(|unit| {
                filter
                    .location
                    .as_deref()
                    .map_or(true, |location| matches_location(unit, location))
            })
            .map(|unit| RawListing::Rentvine {
                property: property.clone(),
                unit,
            })
            .collect())
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                after: self.call_timeout,
            }
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl ProviderTransport for RentvineTransport {
    async fn authenticate(&self) -> Result<AccessToken, ProviderError> {
        Ok(AccessToken::new(
            Credential::Basic {
                username: self.api_key.clone(),
                password: self.api_secret.clone(),
            },
            None,
        ))
    }

    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<ProviderPage, ProviderError> {
        let properties = self
            .get_list(
                token,
                "/properties",
                &[
                    ("page", request.page.to_string()),
                    ("pageSize", request.page_size.to_string()),
                ],
            )
            .await?;
        let has_more = properties.len() as u64 >= u64::from(request.page_size);

        let mut expandable = Vec::with_capacity(properties.len());
        for item in properties {
            let property = unwrap_envelope(item, "property");
            if let Some(wanted) = request.filter.property_type {
                let actual = fields::text(&property, "propertyTypeID")
                    .and_then(|id| PropertyType::from_provider_id(&id));
                if actual != Some(wanted) {
                    continue;
                }
            }

            let Some(property_id) = fields::text(&property, "propertyID") else {
                warn!("skipping provider property without propertyID");
                continue;
            };
            expandable.push((property_id, property));
        }

        let expanded: Vec<Vec<RawListing>> = stream::iter(expandable)
            .map(|(property_id, property)| {
                self.property_units(token, request.filter, property_id, property)
            })
            .buffered(UNIT_FETCH_CONCURRENCY)
            .try_collect()
            .await?;
        let records: Vec<RawListing> = expanded.into_iter().flatten().collect();

        debug!(
            page = request.page,
            records = records.len(),
            has_more,
            "rentvine page expanded"
        );
        Ok(ProviderPage { records, has_more })
    }

    fn bounds_each_call(&self) -> bool {
        true
    }
}

fn authorize(request: RequestBuilder, token: &AccessToken) -> RequestBuilder {
    match token.credential() {
        Credential::Basic { username, password } => request.basic_auth(username, Some(password)),
        Credential::Bearer(value) => request.bearer_auth(value),
    }
}

/// Rentvine wraps list entries as `{"property": {...}}` / `{"unit": {...}}`.
fn unwrap_envelope(item: Value, key: &str) -> Value {
    match item {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or_default(),
        other => other,
    }
}

fn matches_location(unit: &Value, location: &str) -> bool {
    ["city", "postalCode"].iter().any(|key| {
        fields::text(unit, key).is_some_and(|value| fields::contains_ignore_case(&value, location))
    })
}

pub(crate) fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth { status },
        429 => ProviderError::RateLimited { retry_after },
        500..=599 => ProviderError::Unavailable(format!("HTTP {status}: {}", excerpt(body))),
        _ => ProviderError::Request {
            status,
            message: excerpt(body),
        },
    }
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(ERROR_BODY_LIMIT).collect()
}
