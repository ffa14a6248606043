//! Runtime configuration
//!
//! Everything here is read once at startup and shared read-only. Secrets and
//! paths come from the environment; the scene and selection tables are
//! compiled-in defaults that callers may replace before building the service.

use crate::generation::GenerationParams;
use crate::scenes::SceneTable;
use crate::theory::SelectionTables;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const MAX_BASE_DELAY_MS: u64 = 60_000;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first call
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows `attempt` (0-based): base * (attempt + 1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

/// Connection settings for the text-generation service
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: String,
    pub params: GenerationParams,
    /// Per-call HTTP timeout
    pub http_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            params: GenerationParams {
                model: DEFAULT_MODEL.to_string(),
                temperature: 0.7,
                max_tokens: 2000,
            },
            http_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
    /// Budget for one request, covering every attempt and backoff
    pub request_timeout: Duration,
    pub db_path: PathBuf,
    pub scenes: SceneTable,
    pub selection: SelectionTables,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(90),
            db_path: default_db_path(),
            scenes: SceneTable::default(),
            selection: SelectionTables::default(),
        }
    }
}

impl AdvisorConfig {
    /// Defaults overridden by `ADVISOR_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AdvisorConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("ADVISOR_API_KEY").or_else(|| get("ANTHROPIC_API_KEY")) {
            config.generation.api_key = key;
        }
        if let Some(url) = get("ADVISOR_API_URL") {
            config.generation.api_url = url;
        }
        if let Some(model) = get("ADVISOR_MODEL") {
            config.generation.params.model = model;
        }
        if let Some(path) = get("ADVISOR_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        let params = &mut config.generation.params;
        params.temperature = parsed(&get, "ADVISOR_TEMPERATURE", params.temperature);
        params.max_tokens = parsed(&get, "ADVISOR_MAX_TOKENS", params.max_tokens);
        config.retry.max_attempts = bounded(
            &get,
            "ADVISOR_MAX_ATTEMPTS",
            config.retry.max_attempts,
            0..=MAX_RETRY_ATTEMPTS,
        );
        config.retry.base_delay = Duration::from_millis(bounded(
            &get,
            "ADVISOR_BASE_DELAY_MS",
            config.retry.base_delay.as_millis() as u64,
            0..=MAX_BASE_DELAY_MS,
        ));
        config.request_timeout = Duration::from_secs(bounded(
            &get,
            "ADVISOR_REQUEST_TIMEOUT_SECS",
            config.request_timeout.as_secs(),
            1..=MAX_REQUEST_TIMEOUT_SECS,
        ));

        config
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        None => default,
    }
}

/// Like [`parsed`], but values outside `range` also keep the default
fn bounded<T, G>(get: &G, key: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + Copy + PartialOrd + std::fmt::Debug,
    G: Fn(&str) -> Option<String>,
{
    let value = parsed(get, key, default);
    if range.contains(&value) {
        value
    } else {
        tracing::warn!(
            "Ignoring out-of-range value {:?} for {} (allowed {:?}..={:?})",
            value,
            key,
            range.start(),
            range.end()
        );
        default
    }
}

/// `<data dir>/scene-advisor/advisor.db`
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scene-advisor")
        .join("advisor.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(6000));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("ADVISOR_MODEL", "test-model"),
            ("ADVISOR_MAX_ATTEMPTS", "5"),
            ("ADVISOR_BASE_DELAY_MS", "10"),
            ("ADVISOR_DB_PATH", "/tmp/advisor-test.db"),
        ]
        .into_iter()
        .collect();

        let config = AdvisorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.generation.api_key, "sk-test");
        assert_eq!(config.generation.params.model, "test-model");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.db_path, PathBuf::from("/tmp/advisor-test.db"));
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = AdvisorConfig::from_lookup(|k| match k {
            "ADVISOR_MAX_ATTEMPTS" => Some("lots".to_string()),
            "ADVISOR_TEMPERATURE" => Some("warm".to_string()),
            _ => None,
        });
        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.generation.params.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_out_of_range_values_keep_defaults() {
        let config = AdvisorConfig::from_lookup(|k| match k {
            "ADVISOR_REQUEST_TIMEOUT_SECS" => Some("18446744073709551615".to_string()),
            "ADVISOR_BASE_DELAY_MS" => Some("18446744073709551615".to_string()),
            "ADVISOR_MAX_ATTEMPTS" => Some("1000".to_string()),
            _ => None,
        });
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.retry.base_delay, Duration::from_millis(2000));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_zero_timeout_rejected_but_limits_accepted() {
        let config = AdvisorConfig::from_lookup(|k| match k {
            "ADVISOR_REQUEST_TIMEOUT_SECS" => Some("0".to_string()),
            "ADVISOR_MAX_ATTEMPTS" => Some("10".to_string()),
            "ADVISOR_BASE_DELAY_MS" => Some("60000".to_string()),
            _ => None,
        });
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.retry.max_attempts, MAX_RETRY_ATTEMPTS);
        assert_eq!(config.retry.base_delay, Duration::from_millis(MAX_BASE_DELAY_MS));
    }

    #[test]
    fn test_advisor_key_preferred_over_anthropic_key() {
        let config = AdvisorConfig::from_lookup(|k| match k {
            "ADVISOR_API_KEY" => Some("advisor".to_string()),
            "ANTHROPIC_API_KEY" => Some("anthropic".to_string()),
            _ => None,
        });
        assert_eq!(config.generation.api_key, "advisor");
    }
}
