use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Locale;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub bearer_token: Option<String>,
    pub locale: Locale,
    pub storage_dir: Option<PathBuf>,
    pub retry_path: String,
    pub timings: EngineTimings,
}

/// Timer settings shared by the scheduler, session store and effect dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    pub poll_interval: Duration,
    pub poll_max_duration: Duration,
    pub session_max_age: Duration,
    pub modal_token_ttl: Duration,
    pub success_delay: Duration,
    pub failure_delay: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            poll_max_duration: Duration::from_secs(5 * 60),
            session_max_age: Duration::from_secs(30 * 60),
            modal_token_ttl: Duration::from_secs(10 * 60),
            success_delay: Duration::from_millis(2000),
            failure_delay: Duration::from_millis(3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            bearer_token: None,
            locale: Locale::En,
            storage_dir: None,
            retry_path: "/subscription".to_string(),
            timings: EngineTimings::default(),
        }
    }
}

/// Whole seconds, rejecting zero: a zero interval or window is never usable.
fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|&n| n > 0)
        .map(Duration::from_secs)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(raw) => parse_secs(&raw).unwrap_or_else(|| {
            tracing::warn!(%name, value = %raw, "Ignoring invalid duration, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = EngineTimings::default();
        let timings = EngineTimings {
            poll_interval: env_secs("PAYMENT_POLL_INTERVAL_SECS", defaults.poll_interval),
            poll_max_duration: env_secs(
                "PAYMENT_POLL_MAX_DURATION_SECS",
                defaults.poll_max_duration,
            ),
            session_max_age: env_secs("PAYMENT_SESSION_MAX_AGE_SECS", defaults.session_max_age),
            modal_token_ttl: env_secs("PAYMENT_MODAL_TOKEN_TTL_SECS", defaults.modal_token_ttl),
            success_delay: env_millis("PAYMENT_SUCCESS_DELAY_MS", defaults.success_delay),
            failure_delay: env_millis("PAYMENT_FAILURE_DELAY_MS", defaults.failure_delay),
        };

        let locale = env::var("STOREFRONT_LOCALE")
            .ok()
            .and_then(|v| Locale::from_str(&v))
            .unwrap_or(Locale::En);

        Self {
            api_url: env::var("STOREFRONT_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            bearer_token: env::var("STOREFRONT_TOKEN").ok().filter(|t| !t.is_empty()),
            locale,
            storage_dir: env::var("PAYMENT_STORAGE_DIR").ok().map(PathBuf::from),
            retry_path: env::var("PAYMENT_RETRY_PATH")
                .unwrap_or_else(|_| "/subscription".to_string()),
            timings,
        }
    }
}
