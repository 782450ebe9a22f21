use std::time::Duration;
use tracing::warn;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub data_dir: String,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// Settings for the offline cache worker
pub struct WorkerConfig {
    pub cache_prefix: String,
    pub cache_version: String,
    pub api_prefix: String,
    pub offline_page: String,
    pub precache: Vec<String>,
    /// Bound on entries per cache partition, unbounded when unset
    pub max_entries: Option<u64>,
}

/// Retry policy knobs for API calls
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff_ms: 0,
            multiplier: 1,
        }
    }
}

impl Config {
    const DEFAULT_HOST: &str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const DEFAULT_UPSTREAM: &str = "http://localhost:3000";
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_CACHE_PREFIX: &str = "harbor";
    const DEFAULT_CACHE_VERSION: &str = "v1.0.0";
    const DEFAULT_API_PREFIX: &str = "/api/";
    const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";
    const DEFAULT_PRECACHE: &str = "/,/offline.html,/manifest.json";

    pub fn from_env() -> Self {
        let port = std::env::var("HARBOR_PORT")
            .unwrap_or_else(|_| Self::DEFAULT_PORT.to_string())
            .parse::<u16>()
            .unwrap_or(Self::DEFAULT_PORT);

        let upstream_url = std::env::var("HARBOR_UPSTREAM_URL").unwrap_or_else(|_| {
            warn!(
                "HARBOR_UPSTREAM_URL not set, proxying to {}",
                Self::DEFAULT_UPSTREAM
            );
            Self::DEFAULT_UPSTREAM.to_string()
        });

        let offline_page = std::env::var("HARBOR_OFFLINE_PAGE")
            .unwrap_or_else(|_| Self::DEFAULT_OFFLINE_PAGE.to_string());

        Self {
            host: std::env::var("HARBOR_HOST").unwrap_or_else(|_| Self::DEFAULT_HOST.to_string()),
            port,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            data_dir: std::env::var("HARBOR_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            worker: WorkerConfig {
                cache_prefix: std::env::var("HARBOR_CACHE_PREFIX")
                    .unwrap_or_else(|_| Self::DEFAULT_CACHE_PREFIX.to_string()),
                cache_version: std::env::var("HARBOR_CACHE_VERSION")
                    .unwrap_or_else(|_| Self::DEFAULT_CACHE_VERSION.to_string()),
                api_prefix: std::env::var("HARBOR_API_PREFIX")
                    .unwrap_or_else(|_| Self::DEFAULT_API_PREFIX.to_string()),
                precache: split_list(
                    &std::env::var("HARBOR_PRECACHE")
                        .unwrap_or_else(|_| Self::DEFAULT_PRECACHE.to_string()),
                ),
                offline_page,
                max_entries: std::env::var("HARBOR_CACHE_MAX_ENTRIES")
                    .ok()
                    .and_then(|raw| raw.trim().parse().ok()),
            },
            retry: RetryConfig {
                max_retries: env_number("HARBOR_RETRY_MAX", 1),
                backoff_ms: env_number("HARBOR_RETRY_BACKOFF_MS", 0),
                multiplier: env_number("HARBOR_RETRY_MULTIPLIER", 1),
            },
            request_timeout: Duration::from_secs(env_number("HARBOR_REQUEST_TIMEOUT_SECS", 30)),
            connect_timeout: Duration::from_secs(env_number("HARBOR_CONNECT_TIMEOUT_SECS", 10)),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_number<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
