use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};

use crate::workflows::property_query::{
    AccessToken, ConversionTable, Credential, Currency, PageRequest, PropertyQueryEngine,
    ProviderClient, ProviderError, ProviderPage, ProviderSettings, ProviderTransport, RawListing,
    RetryPolicy, TokenCache,
};

/// Scripted provider: pops one response per page call, then serves empty
/// final pages.
#[derive(Default)]
pub(super) struct FakeProvider {
    responses: Mutex<VecDeque<Result<ProviderPage, ProviderError>>>,
    auth_calls: AtomicU32,
    page_calls: AtomicU32,
}

impl FakeProvider {
    pub(super) fn serving(records: Vec<RawListing>) -> Self {
        Self::scripted(vec![Ok(ProviderPage {
            records,
            has_more: false,
        })])
    }

    pub(super) fn scripted(responses: Vec<Result<ProviderPage, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub(super) fn failing(error: ProviderError) -> Self {
        Self::scripted(vec![Err(error.clone()), Err(error.clone()), Err(error)])
    }

    pub(super) fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderTransport for FakeProvider {
    async fn authenticate(&self) -> Result<AccessToken, ProviderError> {
        let call = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(
            Credential::Bearer(format!("fake-{call}")),
            None,
        ))
    }

    async fn fetch_page(
        &self,
        _token: &AccessToken,
        _request: PageRequest<'_>,
    ) -> Result<ProviderPage, ProviderError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("fake provider mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ProviderPage::default()))
    }
}

pub(super) fn unit(id: u32, rent: &str, beds: u32) -> RawListing {
    RawListing::Rentvine {
        property: json!({ "propertyID": "1", "propertyTypeID": "3" }),
        unit: json!({
            "unitID": id.to_string(),
            "address": format!("{id} Ingersoll Ave"),
            "city": "Des Moines",
            "stateID": "IA",
            "postalCode": "50312",
            "rent": rent,
            "beds": beds.to_string(),
            "fullBaths": "1",
            "halfBaths": "0",
            "leaseID": null
        }),
    }
}

pub(super) fn malformed_unit(id: u32) -> RawListing {
    RawListing::Rentvine {
        property: json!({ "propertyID": "1" }),
        unit: json!({ "unitID": id.to_string(), "address": "No Rent Rd", "beds": "1" }),
    }
}

pub(super) fn settings() -> ProviderSettings {
    ProviderSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        },
        request_timeout: Duration::from_secs(1),
        page_size: 50,
        max_pages: 5,
    }
}

pub(super) fn engine(provider: FakeProvider) -> Arc<PropertyQueryEngine<FakeProvider>> {
    let client = ProviderClient::new(provider, Arc::new(TokenCache::new()), settings());
    Arc::new(PropertyQueryEngine::with_rates(
        client,
        ConversionTable::new(Currency::usd()),
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
