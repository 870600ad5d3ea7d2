//! Service configuration, loaded from `GRIDBASE_*` environment variables.
//! Mirrors the `clarium::main` pattern of env-var-driven startup config
//! with logged effective values.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of mutation commands drained per consumer tick.
    pub batch_size: usize,
    /// Delay between consumer ticks.
    pub delay: Duration,
    /// Bounded worker pool size for query handling.
    pub max_workers: usize,
    /// Select the broker-backed task queue instead of the in-process one.
    pub use_rabbitmq: bool,
    /// TTL for cached records and query-result lists.
    pub record_ttl: Duration,
    pub query_ttl: Duration,
    /// TTL for negative ("known absent") cache entries.
    pub negative_ttl: Duration,
    /// TTL for a distributed cache lock.
    pub lock_ttl: Duration,
    /// Back-off before retrying a contended cache lock.
    pub retry_backoff: Duration,
    /// HTTP bind port.
    pub http_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay: Duration::from_secs(5),
            max_workers: 10,
            use_rabbitmq: false,
            record_ttl: Duration::from_secs(3600),
            query_ttl: Duration::from_secs(3600),
            negative_ttl: Duration::from_secs(60),
            lock_ttl: Duration::from_millis(1000),
            retry_backoff: Duration::from_millis(100),
            http_port: 7878,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults for any
    /// variable that is absent or fails to parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_usize("GRIDBASE_BATCH_SIZE", defaults.batch_size),
            delay: Duration::from_secs(env_u64("GRIDBASE_DELAY_SECS", defaults.delay.as_secs())),
            max_workers: env_usize("GRIDBASE_MAX_WORKERS", defaults.max_workers),
            use_rabbitmq: env_bool("GRIDBASE_USE_RABBITMQ", defaults.use_rabbitmq),
            record_ttl: Duration::from_secs(env_u64(
                "GRIDBASE_RECORD_TTL_SECS",
                defaults.record_ttl.as_secs(),
            )),
            query_ttl: Duration::from_secs(env_u64(
                "GRIDBASE_QUERY_TTL_SECS",
                defaults.query_ttl.as_secs(),
            )),
            negative_ttl: Duration::from_secs(env_u64(
                "GRIDBASE_NEGATIVE_TTL_SECS",
                defaults.negative_ttl.as_secs(),
            )),
            lock_ttl: Duration::from_millis(env_u64(
                "GRIDBASE_LOCK_TTL_MS",
                defaults.lock_ttl.as_millis() as u64,
            )),
            retry_backoff: Duration::from_millis(env_u64(
                "GRIDBASE_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )),
            http_port: env_u64("GRIDBASE_HTTP_PORT", defaults.http_port as u64) as u16,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
