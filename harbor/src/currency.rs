//! Placeholder fixed-rate currency conversion and visitor currency detection.

use crate::errors::{ErrorHandler, RawError};
use crate::network::build_client;
use async_trait::async_trait;
use serde::Deserialize;
use shared::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Units of each currency per 1 USD. Not live rates.
const USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("MYR", 4.65),
    ("SGD", 1.34),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("CNY", 7.24),
    ("HKD", 7.82),
    ("INR", 83.1),
    ("IDR", 15600.0),
    ("THB", 35.8),
    ("PHP", 56.2),
    ("VND", 24500.0),
    ("AUD", 1.52),
    ("NZD", 1.64),
    ("CAD", 1.36),
    ("AED", 3.67),
    ("SAR", 3.75),
    ("CHF", 0.88),
];

const COUNTRY_CURRENCIES: &[(&str, &str)] = &[
    ("US", "USD"),
    ("MY", "MYR"),
    ("SG", "SGD"),
    ("GB", "GBP"),
    ("JP", "JPY"),
    ("CN", "CNY"),
    ("HK", "HKD"),
    ("IN", "INR"),
    ("ID", "IDR"),
    ("TH", "THB"),
    ("PH", "PHP"),
    ("VN", "VND"),
    ("AU", "AUD"),
    ("NZ", "NZD"),
    ("CA", "CAD"),
    ("AE", "AED"),
    ("SA", "SAR"),
    ("CH", "CHF"),
    ("DE", "EUR"),
    ("FR", "EUR"),
    ("IT", "EUR"),
    ("ES", "EUR"),
    ("NL", "EUR"),
    ("IE", "EUR"),
];

const TIMEZONE_CURRENCIES: &[(&str, &str)] = &[
    ("Asia/Kuala_Lumpur", "MYR"),
    ("Asia/Kuching", "MYR"),
    ("Asia/Singapore", "SGD"),
    ("Asia/Tokyo", "JPY"),
    ("Asia/Shanghai", "CNY"),
    ("Asia/Hong_Kong", "HKD"),
    ("Asia/Kolkata", "INR"),
    ("Asia/Calcutta", "INR"),
    ("Asia/Jakarta", "IDR"),
    ("Asia/Bangkok", "THB"),
    ("Asia/Manila", "PHP"),
    ("Asia/Ho_Chi_Minh", "VND"),
    ("Asia/Dubai", "AED"),
    ("Asia/Riyadh", "SAR"),
    ("Europe/London", "GBP"),
    ("Europe/Zurich", "CHF"),
    ("Europe/Berlin", "EUR"),
    ("Europe/Paris", "EUR"),
    ("Europe/Madrid", "EUR"),
    ("Europe/Rome", "EUR"),
    ("Europe/Amsterdam", "EUR"),
    ("Europe/Dublin", "EUR"),
    ("Australia/Sydney", "AUD"),
    ("Australia/Melbourne", "AUD"),
    ("Pacific/Auckland", "NZD"),
    ("America/Toronto", "CAD"),
    ("America/Vancouver", "CAD"),
    ("America/New_York", "USD"),
    ("America/Chicago", "USD"),
    ("America/Denver", "USD"),
    ("America/Los_Angeles", "USD"),
];

fn rate(currency: &str) -> Option<f64> {
    USD_RATES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(currency))
        .map(|(_, rate)| *rate)
}

pub fn is_supported(currency: &str) -> bool {
    rate(currency).is_some()
}

/// Convert `amount` between two currencies, rounded to cents
pub fn convert(amount: f64, from: &str, to: &str) -> Result<f64> {
    let from_rate =
        rate(from).ok_or_else(|| Error::InvalidInput(format!("unsupported currency '{from}'")))?;
    let to_rate =
        rate(to).ok_or_else(|| Error::InvalidInput(format!("unsupported currency '{to}'")))?;

    if from.eq_ignore_ascii_case(to) {
        return Ok(amount);
    }

    let converted = amount / from_rate * to_rate;
    Ok((converted * 100.0).round() / 100.0)
}

pub fn currency_for_country(country_code: &str) -> Option<&'static str> {
    COUNTRY_CURRENCIES
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(country_code))
        .map(|(_, currency)| *currency)
}

pub fn currency_for_timezone(timezone: &str) -> Option<&'static str> {
    TIMEZONE_CURRENCIES
        .iter()
        .find(|(tz, _)| *tz == timezone)
        .map(|(_, currency)| *currency)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country_code: Option<String>,
    pub currency: Option<String>,
}

impl GeoLocation {
    /// A supported currency, directly or through the country
    pub fn resolve_currency(&self) -> Option<String> {
        self.currency
            .as_deref()
            .filter(|c| is_supported(c))
            .map(str::to_ascii_uppercase)
            .or_else(|| {
                self.country_code
                    .as_deref()
                    .and_then(currency_for_country)
                    .map(str::to_string)
            })
    }
}

/// A source of the visitor's location
#[async_trait]
pub trait GeoLocator: Send + Sync {
    fn name(&self) -> &str;
    async fn locate(&self) -> std::result::Result<GeoLocation, RawError>;
}

#[derive(Debug, Deserialize)]
struct IpApiCoResponse {
    country_code: Option<String>,
    currency: Option<String>,
}

/// ipapi.co, which reports the currency directly
pub struct IpApiCo {
    client: reqwest::Client,
    url: String,
}

impl IpApiCo {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: geo_client(timeout)?,
            url: "https://ipapi.co/json/".to_string(),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiCo {
    fn name(&self) -> &str {
        "ipapi.co"
    }

    async fn locate(&self) -> std::result::Result<GeoLocation, RawError> {
        let body: IpApiCoResponse = fetch_json(&self.client, &self.url).await?;
        Ok(GeoLocation {
            country_code: body.country_code,
            currency: body.currency,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiComResponse {
    status: Option<String>,
    country_code: Option<String>,
}

/// ip-api.com, which only reports the country
pub struct IpApiCom {
    client: reqwest::Client,
    url: String,
}

impl IpApiCom {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: geo_client(timeout)?,
            url: "http://ip-api.com/json/?fields=status,countryCode".to_string(),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiCom {
    fn name(&self) -> &str {
        "ip-api.com"
    }

    async fn locate(&self) -> std::result::Result<GeoLocation, RawError> {
        let body: IpApiComResponse = fetch_json(&self.client, &self.url).await?;
        if body.status.as_deref() == Some("fail") {
            return Err(RawError::Other("ip-api.com lookup failed".to_string()));
        }
        Ok(GeoLocation {
            country_code: body.country_code,
            currency: None,
        })
    }
}

fn geo_client(timeout: Duration) -> Result<reqwest::Client> {
    build_client(reqwest::Client::builder().timeout(timeout))
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> std::result::Result<T, RawError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RawError::Status {
            status: status.as_u16(),
            body: response.json().await.ok(),
        });
    }
    Ok(response.json().await?)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionSource {
    Geolocation(String),
    Timezone(String),
    Default,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub currency: String,
    pub source: DetectionSource,
}

/// Chains geolocation lookups, then the timezone table, then USD
pub struct CurrencyDetector {
    locators: Vec<Arc<dyn GeoLocator>>,
    handler: ErrorHandler,
    timezone: Option<String>,
}

impl CurrencyDetector {
    pub fn new(handler: ErrorHandler) -> Self {
        Self {
            locators: Vec::new(),
            handler,
            timezone: None,
        }
    }

    /// ipapi.co first, ip-api.com second
    pub fn with_default_locators(handler: ErrorHandler, timeout: Duration) -> Result<Self> {
        Ok(Self::new(handler)
            .with_locator(Arc::new(IpApiCo::new(timeout)?))
            .with_locator(Arc::new(IpApiCom::new(timeout)?)))
    }

    pub fn with_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub async fn detect(&self) -> Detection {
        for locator in &self.locators {
            let context = format!("geolocation via {}", locator.name());
            match self
                .handler
                .with_retry(Some(context.as_str()), || locator.locate())
                .await
            {
                Ok(location) => {
                    if let Some(currency) = location.resolve_currency() {
                        tracing::debug!("Detected {} via {}", currency, locator.name());
                        return Detection {
                            currency,
                            source: DetectionSource::Geolocation(locator.name().to_string()),
                        };
                    }
                    tracing::debug!("{} gave no usable currency: {:?}", locator.name(), location);
                }
                Err(e) => {
                    tracing::info!("{} failed: {}", locator.name(), e);
                }
            }
        }

        if let Some(tz) = &self.timezone {
            if let Some(currency) = currency_for_timezone(tz) {
                return Detection {
                    currency: currency.to_string(),
                    source: DetectionSource::Timezone(tz.clone()),
                };
            }
        }

        Detection {
            currency: DEFAULT_CURRENCY.to_string(),
            source: DetectionSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLocator {
        name: &'static str,
        result: fn() -> std::result::Result<GeoLocation, RawError>,
        calls: AtomicUsize,
    }

    impl ScriptedLocator {
        fn new(
            name: &'static str,
            result: fn() -> std::result::Result<GeoLocation, RawError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GeoLocator for ScriptedLocator {
        fn name(&self) -> &str {
            self.name
        }

        async fn locate(&self) -> std::result::Result<GeoLocation, RawError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    #[test]
    fn test_usd_to_myr() {
        assert_eq!(convert(100.0, "USD", "MYR").unwrap(), 465.0);
    }

    #[test]
    fn test_cross_rate_and_identity() {
        assert_eq!(convert(465.0, "MYR", "USD").unwrap(), 100.0);
        assert_eq!(convert(12.345, "eur", "EUR").unwrap(), 12.345);
        assert_eq!(convert(0.0, "GBP", "JPY").unwrap(), 0.0);
    }

    #[test]
    fn test_unsupported_currency() {
        assert!(matches!(
            convert(1.0, "USD", "XYZ"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_lookup_tables() {
        assert_eq!(currency_for_country("my"), Some("MYR"));
        assert_eq!(currency_for_timezone("Asia/Kuala_Lumpur"), Some("MYR"));
        assert_eq!(currency_for_timezone("Mars/Olympus_Mons"), None);
    }

    #[test]
    fn test_default_locator_order() {
        let detector =
            CurrencyDetector::with_default_locators(ErrorHandler::default(), Duration::from_secs(3))
                .unwrap();
        let names: Vec<&str> = detector.locators.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["ipapi.co", "ip-api.com"]);
    }

    #[test]
    fn test_resolve_currency_prefers_reported_currency() {
        let location = GeoLocation {
            country_code: Some("SG".into()),
            currency: Some("myr".into()),
        };
        assert_eq!(location.resolve_currency().as_deref(), Some("MYR"));

        let unsupported = GeoLocation {
            country_code: Some("GB".into()),
            currency: Some("XTS".into()),
        };
        assert_eq!(unsupported.resolve_currency().as_deref(), Some("GBP"));
    }

    #[tokio::test]
    async fn test_first_locator_wins() {
        let first = ScriptedLocator::new("first", || {
            Ok(GeoLocation {
                country_code: Some("SG".into()),
                currency: Some("SGD".into()),
            })
        });
        let second = ScriptedLocator::new("second", || Ok(GeoLocation::default()));

        let detector = CurrencyDetector::new(ErrorHandler::default())
            .with_locator(first.clone())
            .with_locator(second.clone());

        let detection = detector.detect().await;
        assert_eq!(detection.currency, "SGD");
        assert_eq!(
            detection.source,
            DetectionSource::Geolocation("first".into())
        );
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_second_locator_after_retry() {
        let first = ScriptedLocator::new("first", || {
            Err(RawError::Network("connection refused".into()))
        });
        let second = ScriptedLocator::new("second", || {
            Ok(GeoLocation {
                country_code: Some("MY".into()),
                currency: None,
            })
        });

        let detector = CurrencyDetector::new(ErrorHandler::default())
            .with_locator(first.clone())
            .with_locator(second);

        let detection = detector.detect().await;
        assert_eq!(detection.currency, "MYR");
        // One retry for the transient failure
        assert_eq!(first.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timezone_then_default() {
        let failing = ScriptedLocator::new("down", || {
            Err(RawError::Status {
                status: 403,
                body: None,
            })
        });

        let detector = CurrencyDetector::new(ErrorHandler::default())
            .with_locator(failing.clone())
            .with_timezone("Asia/Kuala_Lumpur");
        let detection = detector.detect().await;
        assert_eq!(detection.currency, "MYR");
        assert_eq!(
            detection.source,
            DetectionSource::Timezone("Asia/Kuala_Lumpur".into())
        );
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

        let bare = CurrencyDetector::new(ErrorHandler::default()).with_timezone("Etc/UTC");
        assert_eq!(
            bare.detect().await,
            Detection {
                currency: "USD".into(),
                source: DetectionSource::Default
            }
        );
    }
}
