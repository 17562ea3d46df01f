//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    ApprovalArgs, ApprovalCommand, BatchFetchArgs, BatchFetchCommand, CliArgs, Command,
    DecisionArgs, FeedAddArgs, FeedsArgs, FeedsCommand, GlobalOverrides, LeadFilterArgs,
    LeadsArgs, LeadsCommand, LoginArgs, ScrapesArgs,
};

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::api::ApiConfig;
use crate::cache::CacheConfig;
use crate::polling::PollingConfig;
use crate::session::SessionConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "curator";
const ENV_PREFIX: &str = "CURATOR";
const DEFAULT_STATE_DIR: &str = ".curator";

/// Fully-resolved console settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub polling: PollingConfig,
    pub session: SessionConfig,
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

impl Settings {
    /// Directory of the persisted session file.
    pub fn state_dir(&self) -> PathBuf {
        self.session
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            cache: CacheConfig::default(),
            polling: PollingConfig::default(),
            session: SessionConfig::default(),
        }
    }
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
    api: RawApiSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    polling: RawPollingSettings,
    session: RawSessionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.api_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(url) = overrides.auth_url.as_ref() {
            self.api.auth_url = Some(url.clone());
        }
        if let Some(dir) = overrides.state_dir.as_ref() {
            self.session.state_dir = Some(dir.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            logging,
            cache,
            polling,
            session,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            polling: build_polling_settings(polling)?,
            session: build_session_settings(session)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiConfig, LoadError> {
    let defaults = ApiConfig::default();
    let base_url = checked_url(api.base_url, defaults.base_url, "api.base_url")?;
    let auth_url = checked_url(api.auth_url, defaults.auth_url, "api.auth_url")?;

    Ok(ApiConfig {
        base_url,
        auth_url,
        attach_session_token: api
            .attach_session_token
            .unwrap_or(defaults.attach_session_token),
    })
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();
    let stale_time_ms = cache.stale_time_ms.unwrap_or(defaults.stale_time_ms);
    let gc_time_ms = non_zero(
        cache.gc_time_ms.unwrap_or(defaults.gc_time_ms),
        "cache.gc_time_ms",
    )?;
    if gc_time_ms < stale_time_ms {
        return Err(LoadError::invalid(
            "cache.gc_time_ms",
            "must not be shorter than cache.stale_time_ms",
        ));
    }

    Ok(CacheConfig {
        stale_time_ms,
        gc_time_ms,
        query_retry_limit: cache
            .query_retry_limit
            .unwrap_or(defaults.query_retry_limit),
    })
}

fn build_polling_settings(polling: RawPollingSettings) -> Result<PollingConfig, LoadError> {
    let defaults = PollingConfig::default();
    let active_interval_ms = non_zero(
        polling
            .active_interval_ms
            .unwrap_or(defaults.active_interval_ms),
        "polling.active_interval_ms",
    )?;
    let idle_interval_ms = non_zero(
        polling.idle_interval_ms.unwrap_or(defaults.idle_interval_ms),
        "polling.idle_interval_ms",
    )?;

    Ok(PollingConfig {
        active_interval_ms,
        idle_interval_ms,
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionConfig, LoadError> {
    let defaults = SessionConfig::default();
    let expiry_buffer_secs = session
        .expiry_buffer_secs
        .unwrap_or(defaults.expiry_buffer_secs);
    if i64::try_from(expiry_buffer_secs).is_err() {
        return Err(LoadError::invalid(
            "session.expiry_buffer_secs",
            "value exceeds supported range",
        ));
    }

    let state_dir = session.state_dir.filter(|dir| !dir.as_os_str().is_empty());

    Ok(SessionConfig {
        expiry_buffer_secs,
        state_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    auth_url: Option<String>,
    attach_session_token: Option<bool>,
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
    stale_time_ms: Option<u64>,
    gc_time_ms: Option<u64>,
    query_retry_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPollingSettings {
    active_interval_ms: Option<u64>,
    idle_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    expiry_buffer_secs: Option<u64>,
    state_dir: Option<PathBuf>,
}

fn checked_url(
    value: Option<String>,
    default: String,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or(default);
    let parsed =
        Url::parse(&value).map_err(|err| LoadError::invalid(key, format!("invalid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(value)
}

fn non_zero(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}
