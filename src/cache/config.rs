//! Cache configuration.
//!
//! Controls store capacity, query freshness and retry behaviour via the
//! `[cache]` section of `caseflow.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::query::RetryPolicy;

const DEFAULT_ENTITY_LIMIT: usize = 500;
const DEFAULT_COLLECTION_LIMIT: usize = 50;
const DEFAULT_QUERY_LIMIT: usize = 256;
const DEFAULT_LIST_STALE_TIME_MS: u64 = 60_000;
const DEFAULT_DETAIL_STALE_TIME_MS: u64 = 0;
const DEFAULT_LIST_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DETAIL_RETRY_ATTEMPTS: u32 = 0;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 4_000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Cache configuration from `caseflow.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entities held by the resource store.
    pub entity_limit: usize,
    /// Maximum collections held by the resource store.
    pub collection_limit: usize,
    /// Maximum query entries tracked by the coordinator.
    pub query_limit: usize,
    /// Freshness window for list queries.
    pub list_stale_time_ms: u64,
    /// Freshness window for detail queries.
    pub detail_stale_time_ms: u64,
    /// Retries after the first failed list fetch.
    pub list_retry_attempts: u32,
    /// Retries after the first failed detail fetch.
    pub detail_retry_attempts: u32,
    /// First backoff delay; doubles per retry.
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling.
    pub retry_max_delay_ms: u64,
    /// Refetch invalidated queries that still have subscribers.
    pub refetch_active_on_invalidate: bool,
    /// Maximum events per invalidation batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entity_limit: DEFAULT_ENTITY_LIMIT,
            collection_limit: DEFAULT_COLLECTION_LIMIT,
            query_limit: DEFAULT_QUERY_LIMIT,
            list_stale_time_ms: DEFAULT_LIST_STALE_TIME_MS,
            detail_stale_time_ms: DEFAULT_DETAIL_STALE_TIME_MS,
            list_retry_attempts: DEFAULT_LIST_RETRY_ATTEMPTS,
            detail_retry_attempts: DEFAULT_DETAIL_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            refetch_active_on_invalidate: true,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            entity_limit: settings.entity_limit.get(),
            collection_limit: settings.collection_limit.get(),
            query_limit: settings.query_limit.get(),
            list_stale_time_ms: duration_ms(settings.list_stale_time),
            detail_stale_time_ms: duration_ms(settings.detail_stale_time),
            list_retry_attempts: settings.list_retry_attempts,
            detail_retry_attempts: settings.detail_retry_attempts,
            retry_base_delay_ms: duration_ms(settings.retry_base_delay),
            retry_max_delay_ms: duration_ms(settings.retry_max_delay),
            refetch_active_on_invalidate: settings.refetch_active_on_invalidate,
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl CacheConfig {
    /// Returns the entity limit as NonZeroUsize, clamping to 1 if zero.
    pub fn entity_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entity_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the collection limit as NonZeroUsize, clamping to 1 if zero.
    pub fn collection_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.collection_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the query limit as NonZeroUsize, clamping to 1 if zero.
    pub fn query_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn list_stale_time(&self) -> Duration {
        Duration::from_millis(self.list_stale_time_ms)
    }

    pub fn detail_stale_time(&self) -> Duration {
        Duration::from_millis(self.detail_stale_time_ms)
    }

    pub fn list_retry(&self) -> RetryPolicy {
        self.retry_policy(self.list_retry_attempts)
    }

    pub fn detail_retry(&self) -> RetryPolicy {
        self.retry_policy(self.detail_retry_attempts)
    }

    fn retry_policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.entity_limit, 500);
        assert_eq!(config.collection_limit, 50);
        assert_eq!(config.query_limit, 256);
        assert_eq!(config.list_stale_time(), Duration::from_secs(60));
        assert_eq!(config.detail_stale_time(), Duration::ZERO);
        assert_eq!(config.list_retry_attempts, 3);
        assert_eq!(config.detail_retry_attempts, 0);
        assert!(config.refetch_active_on_invalidate);
        assert_eq!(config.consume_batch_limit, 100);
    }

    #[test]
    fn list_and_detail_retry_are_asymmetric() {
        let config = CacheConfig::default();
        assert_eq!(config.list_retry().attempts, 3);
        assert_eq!(config.detail_retry().attempts, 0);
        assert_eq!(config.list_retry().base_delay, Duration::from_millis(250));
        assert_eq!(config.list_retry().max_delay, Duration::from_secs(4));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            entity_limit: 0,
            query_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.entity_limit_non_zero().get(), 1);
        assert_eq!(config.query_limit_non_zero().get(), 1);
        assert_eq!(config.collection_limit_non_zero().get(), 50);
    }
}
