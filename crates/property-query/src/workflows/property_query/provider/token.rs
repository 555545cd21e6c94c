use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::ProviderError;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Credential attached to outbound provider requests.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    Bearer(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    credential: Credential,
    expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn new(credential: Credential, expires_at: Option<Instant>) -> Self {
        Self {
            credential,
            expires_at,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |at| Instant::now() + EXPIRY_SKEW >= at)
    }
}

/// Process-wide provider token cache.
///
/// Reads share an `RwLock`. Refreshes are serialized behind a separate mutex so
/// only one refresh is in flight; callers queued behind it re-check the cache
/// and reuse the token it produced.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token when present and not expired.
    pub async fn current(&self) -> Option<AccessToken> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| !token.is_expired())
            .cloned()
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<AccessToken, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ProviderError>>,
    {
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let token = refresh().await?;
        *self.current.write().await = Some(token.clone());
        let count = self.refreshes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(refreshes = count, "provider token refreshed");
        Ok(token)
    }

    /// Drops the cached token, but only if it is the one that was rejected.
    pub async fn invalidate(&self, rejected: &AccessToken) {
        let mut guard = self.current.write().await;
        if guard.as_ref() == Some(rejected) {
            *guard = None;
            tracing::debug!("provider token invalidated");
        }
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}
