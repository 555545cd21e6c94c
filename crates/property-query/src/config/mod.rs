use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;

use crate::workflows::property_query::{ConversionTable, Currency, ProviderSettings, RetryPolicy};

const DEFAULT_SUBDOMAIN: &str = "securedoorpm";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub provider: ProviderConfig,
    pub currency: CurrencyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                with_targets: environment != AppEnvironment::Production,
            },
            provider: ProviderConfig::from_env()?,
            currency: CurrencyConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub with_targets: bool,
}

/// Listings provider connection and paging limits.
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub page_size: u32,
    pub max_pages: u32,
    /// Currency of amounts reported by the provider.
    pub currency: Currency,
}

impl ProviderConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let subdomain = var_or("RENTVINE_SUBDOMAIN", DEFAULT_SUBDOMAIN);
        let base_url = env::var("RENTVINE_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| format!("https://{subdomain}.rentvine.com/api/manager"));

        Ok(Self {
            base_url,
            api_key: non_empty_var("RENTVINE_API_KEY"),
            api_secret: non_empty_var("RENTVINE_API_SECRET"),
            request_timeout: Duration::from_secs(number("PROVIDER_TIMEOUT_SECS", 10)?),
            max_attempts: number("PROVIDER_MAX_ATTEMPTS", 3)?,
            backoff: Duration::from_millis(number("PROVIDER_BACKOFF_MS", 250)?),
            max_backoff: Duration::from_millis(number("PROVIDER_MAX_BACKOFF_MS", 4000)?),
            page_size: number("PROVIDER_PAGE_SIZE", 50)?,
            max_pages: number("PROVIDER_MAX_PAGES", 20)?,
            currency: currency("PROVIDER_CURRENCY")?,
        })
    }

    /// API key and secret; required before any provider call is made.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: self.backoff,
                max_delay: self.max_backoff.max(self.backoff),
            },
            request_timeout: self.request_timeout,
            page_size: self.page_size.max(1),
            max_pages: self.max_pages.max(1),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("currency", &self.currency)
            .finish()
    }
}

/// Working currency and the fixed rates used to reach it.
#[derive(Debug, Clone)]
pub struct CurrencyConfig {
    pub working: Currency,
    pub rates: Vec<(Currency, Decimal)>,
}

impl CurrencyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            working: currency("QUERY_WORKING_CURRENCY")?,
            rates: parse_rates(&var_or("QUERY_FX_RATES", ""))?,
        })
    }

    pub fn conversion_table(&self) -> ConversionTable {
        self.rates
            .iter()
            .fold(ConversionTable::new(self.working.clone()), |table, (code, rate)| {
                table.with_rate(code.clone(), *rate)
            })
    }
}

/// Parses `CAD=0.74,EUR=1.08` into (currency, rate) pairs.
fn parse_rates(raw: &str) -> Result<Vec<(Currency, Decimal)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ConfigError::InvalidRate {
                entry: entry.to_string(),
            };
            let (code, rate) = entry.split_once('=').ok_or_else(invalid)?;
            let code = Currency::parse(code).ok_or_else(invalid)?;
            let rate: Decimal = rate.trim().parse().map_err(|_| invalid())?;
            if rate <= Decimal::ZERO {
                return Err(invalid());
            }
            Ok((code, rate))
        })
        .collect()
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn number<N: std::str::FromStr>(name: &'static str, default: N) -> Result<N, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}

fn currency(name: &'static str) -> Result<Currency, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => Currency::parse(&raw).ok_or(ConfigError::InvalidCurrency { name, value: raw }),
        None => Ok(Currency::usd()),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidCurrency { name: &'static str, value: String },
    InvalidRate { entry: String },
    MissingCredentials,
    HttpClient { source: reqwest::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a non-negative integer, got '{value}'")
            }
            ConfigError::InvalidCurrency { name, value } => {
                write!(f, "{name} must be a three-letter currency code, got '{value}'")
            }
            ConfigError::InvalidRate { entry } => write!(
                f,
                "QUERY_FX_RATES entry '{entry}' must look like CODE=rate with a positive rate"
            ),
            ConfigError::MissingCredentials => write!(
                f,
                "RENTVINE_API_KEY and RENTVINE_API_SECRET must be set to query listings"
            ),
            ConfigError::HttpClient { .. } => write!(f, "unable to build provider HTTP client"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::HttpClient { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidCurrency { .. }
            | ConfigError::InvalidRate { .. }
            | ConfigError::MissingCredentials => None,
        }
    }
}
