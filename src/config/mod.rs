//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, DemoArgs, ListArgs, SetStatusArgs, SettingsOverrides, ShowArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "caseflow";
const ENV_PREFIX: &str = "CASEFLOW";

const DEFAULT_ENTITY_LIMIT: u64 = 500;
const DEFAULT_COLLECTION_LIMIT: u64 = 50;
const DEFAULT_QUERY_LIMIT: u64 = 256;
const DEFAULT_LIST_STALE_TIME_MS: u64 = 60_000;
const DEFAULT_DETAIL_STALE_TIME_MS: u64 = 0;
const DEFAULT_LIST_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DETAIL_RETRY_ATTEMPTS: u32 = 0;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 4_000;
const DEFAULT_CONSUME_BATCH_LIMIT: u64 = 100;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_READ_LATENCY_MIN_MS: u64 = 400;
const DEFAULT_READ_LATENCY_MAX_MS: u64 = 1_000;
const DEFAULT_UPDATE_LATENCY_MIN_MS: u64 = 800;
const DEFAULT_UPDATE_LATENCY_MAX_MS: u64 = 1_500;
const DEFAULT_FAILURE_RATE: f64 = 0.08;
const DEFAULT_SEED_COUNT: usize = 8;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub service: ServiceSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub entity_limit: NonZeroUsize,
    pub collection_limit: NonZeroUsize,
    pub query_limit: NonZeroUsize,
    pub list_stale_time: Duration,
    pub detail_stale_time: Duration,
    pub list_retry_attempts: u32,
    pub detail_retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub refetch_active_on_invalidate: bool,
    pub consume_batch_limit: NonZeroUsize,
}

/// Data-service settings: the call budget plus the simulated service's
/// latency and failure injection.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub request_timeout: Duration,
    pub read_latency_min: Duration,
    pub read_latency_max: Duration,
    pub update_latency_min: Duration,
    pub update_latency_max: Duration,
    pub failure_rate: f64,
    pub seed_count: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    service: RawServiceSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.service_timeout_seconds {
            self.service.request_timeout_seconds = Some(seconds);
        }
        if let Some(rate) = overrides.service_failure_rate {
            self.service.failure_rate = Some(rate);
        }
        if let Some(count) = overrides.service_seed_count {
            self.service.seed_count = Some(count);
        }
        if overrides.no_latency {
            self.service.read_latency_min_ms = Some(0);
            self.service.read_latency_max_ms = Some(0);
            self.service.update_latency_min_ms = Some(0);
            self.service.update_latency_max_ms = Some(0);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            service,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            service: build_service_settings(service)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let entity_limit = non_zero_usize(
        cache.entity_limit.unwrap_or(DEFAULT_ENTITY_LIMIT),
        "cache.entity_limit",
    )?;
    let collection_limit = non_zero_usize(
        cache.collection_limit.unwrap_or(DEFAULT_COLLECTION_LIMIT),
        "cache.collection_limit",
    )?;
    let query_limit = non_zero_usize(
        cache.query_limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        "cache.query_limit",
    )?;
    let consume_batch_limit = non_zero_usize(
        cache
            .consume_batch_limit
            .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT),
        "cache.consume_batch_limit",
    )?;

    let retry_base_delay = Duration::from_millis(
        cache
            .retry_base_delay_ms
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
    );
    let retry_max_delay = Duration::from_millis(
        cache
            .retry_max_delay_ms
            .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
    );
    if retry_base_delay > retry_max_delay {
        return Err(LoadError::invalid(
            "cache.retry_base_delay_ms",
            "must not exceed cache.retry_max_delay_ms",
        ));
    }

    Ok(CacheSettings {
        entity_limit,
        collection_limit,
        query_limit,
        list_stale_time: Duration::from_millis(
            cache
                .list_stale_time_ms
                .unwrap_or(DEFAULT_LIST_STALE_TIME_MS),
        ),
        detail_stale_time: Duration::from_millis(
            cache
                .detail_stale_time_ms
                .unwrap_or(DEFAULT_DETAIL_STALE_TIME_MS),
        ),
        list_retry_attempts: cache
            .list_retry_attempts
            .unwrap_or(DEFAULT_LIST_RETRY_ATTEMPTS),
        detail_retry_attempts: cache
            .detail_retry_attempts
            .unwrap_or(DEFAULT_DETAIL_RETRY_ATTEMPTS),
        retry_base_delay,
        retry_max_delay,
        refetch_active_on_invalidate: cache.refetch_active_on_invalidate.unwrap_or(true),
        consume_batch_limit,
    })
}

fn build_service_settings(service: RawServiceSettings) -> Result<ServiceSettings, LoadError> {
    let timeout_secs = service
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&timeout_secs) {
        return Err(LoadError::invalid(
            "service.request_timeout_seconds",
            format!("must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"),
        ));
    }

    let (read_latency_min, read_latency_max) = latency_range(
        service
            .read_latency_min_ms
            .unwrap_or(DEFAULT_READ_LATENCY_MIN_MS),
        service
            .read_latency_max_ms
            .unwrap_or(DEFAULT_READ_LATENCY_MAX_MS),
        "service.read_latency_min_ms",
    )?;
    let (update_latency_min, update_latency_max) = latency_range(
        service
            .update_latency_min_ms
            .unwrap_or(DEFAULT_UPDATE_LATENCY_MIN_MS),
        service
            .update_latency_max_ms
            .unwrap_or(DEFAULT_UPDATE_LATENCY_MAX_MS),
        "service.update_latency_min_ms",
    )?;

    let failure_rate = service.failure_rate.unwrap_or(DEFAULT_FAILURE_RATE);
    if !(0.0..=1.0).contains(&failure_rate) {
        return Err(LoadError::invalid(
            "service.failure_rate",
            "must be between 0.0 and 1.0",
        ));
    }

    Ok(ServiceSettings {
        request_timeout: Duration::from_secs(timeout_secs),
        read_latency_min,
        read_latency_max,
        update_latency_min,
        update_latency_max,
        failure_rate,
        seed_count: service.seed_count.unwrap_or(DEFAULT_SEED_COUNT),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    entity_limit: Option<u64>,
    collection_limit: Option<u64>,
    query_limit: Option<u64>,
    list_stale_time_ms: Option<u64>,
    detail_stale_time_ms: Option<u64>,
    list_retry_attempts: Option<u32>,
    detail_retry_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    refetch_active_on_invalidate: Option<bool>,
    consume_batch_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServiceSettings {
    request_timeout_seconds: Option<u64>,
    read_latency_min_ms: Option<u64>,
    read_latency_max_ms: Option<u64>,
    update_latency_min_ms: Option<u64>,
    update_latency_max_ms: Option<u64>,
    failure_rate: Option<f64>,
    seed_count: Option<usize>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn latency_range(
    min_ms: u64,
    max_ms: u64,
    key: &'static str,
) -> Result<(Duration, Duration), LoadError> {
    if min_ms > max_ms {
        return Err(LoadError::invalid(
            key,
            format!("minimum {min_ms} ms exceeds maximum {max_ms} ms"),
        ));
    }
    Ok((Duration::from_millis(min_ms), Duration::from_millis(max_ms)))
}
