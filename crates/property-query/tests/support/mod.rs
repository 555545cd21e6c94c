#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use property_query::workflows::property_query::{
    AccessToken, ConversionTable, Credential, Currency, PageRequest, PropertyQueryEngine,
    ProviderClient, ProviderError, ProviderPage, ProviderSettings, ProviderTransport, RawListing,
    RetryPolicy, TokenCache,
};
use serde_json::json;

/// In-memory provider serving a fixed inventory in pages.
pub struct InMemoryProvider {
    inventory: Vec<RawListing>,
    page_size: usize,
    /// Number of leading page calls answered with 401.
    reject_first: Mutex<u32>,
    auth_calls: AtomicU32,
    page_calls: AtomicU32,
    accepted: Mutex<Vec<String>>,
}

impl InMemoryProvider {
    pub fn new(inventory: Vec<RawListing>) -> Self {
        Self {
            inventory,
            page_size: 50,
            reject_first: Mutex::new(0),
            auth_calls: AtomicU32::new(0),
            page_calls: AtomicU32::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn rejecting_first_token(self) -> Self {
        *self.reject_first.lock().unwrap() = 1;
        self
    }

    pub fn auth_calls(&self) -> u32 {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// Bearer tokens that were accepted by a page call, in order.
    pub fn accepted_tokens(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderTransport for InMemoryProvider {
    async fn authenticate(&self) -> Result<AccessToken, ProviderError> {
        let call = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(
            Credential::Bearer(format!("token-{call}")),
            None,
        ))
    }

    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<ProviderPage, ProviderError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut reject = self.reject_first.lock().unwrap();
            if *reject > 0 {
                *reject -= 1;
                return Err(ProviderError::Auth { status: 401 });
            }
        }
        if let Credential::Bearer(value) = token.credential() {
            self.accepted.lock().unwrap().push(value.clone());
        }

        let start = (request.page as usize - 1) * self.page_size;
        let records: Vec<_> = self
            .inventory
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        Ok(ProviderPage {
            has_more: start + records.len() < self.inventory.len(),
            records,
        })
    }
}

pub fn unit(id: u32, rent: &str, beds: u32) -> RawListing {
    RawListing::Rentvine {
        property: json!({ "propertyID": "7", "propertyTypeID": "1" }),
        unit: json!({
            "unitID": id.to_string(),
            "address": format!("{id} Woodland Ave"),
            "city": "West Des Moines",
            "stateID": "IA",
            "postalCode": "50265",
            "rent": rent,
            "beds": beds.to_string(),
            "fullBaths": "2",
            "leaseID": null
        }),
    }
}

pub fn settings(max_pages: u32) -> ProviderSettings {
    ProviderSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        },
        request_timeout: Duration::from_secs(2),
        page_size: 50,
        max_pages,
    }
}

pub fn engine_with(
    provider: InMemoryProvider,
    tokens: Arc<TokenCache>,
    max_pages: u32,
) -> PropertyQueryEngine<InMemoryProvider> {
    PropertyQueryEngine::with_rates(
        ProviderClient::new(provider, tokens, settings(max_pages)),
        ConversionTable::new(Currency::usd()),
    )
}

pub fn engine(provider: InMemoryProvider) -> PropertyQueryEngine<InMemoryProvider> {
    engine_with(provider, Arc::new(TokenCache::new()), 20)
}
