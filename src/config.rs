use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub location_poll_interval_secs: u64,
    pub eta_refresh_interval_secs: u64,
    pub tracking_base_url: String,
    pub route_horizon_hours: i64,
    pub session_ttl_hours: i64,
    pub default_language: String,
    pub default_timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            location_poll_interval_secs: 30,
            eta_refresh_interval_secs: 60,
            tracking_base_url: "http://localhost:3000".to_string(),
            route_horizon_hours: 8,
            session_ttl_hours: 24,
            default_language: "en".to_string(),
            default_timezone: "UTC".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or_default("LOG_FORMAT", defaults.log_format)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            location_poll_interval_secs: parse_or_default(
                "LOCATION_POLL_INTERVAL_SECS",
                defaults.location_poll_interval_secs,
            )?,
            eta_refresh_interval_secs: parse_or_default(
                "ETA_REFRESH_INTERVAL_SECS",
                defaults.eta_refresh_interval_secs,
            )?,
            tracking_base_url: env::var("TRACKING_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.tracking_base_url),
            route_horizon_hours: parse_or_default(
                "ROUTE_HORIZON_HOURS",
                defaults.route_horizon_hours,
            )?,
            session_ttl_hours: parse_or_default("SESSION_TTL_HOURS", defaults.session_ttl_hours)?,
            default_language: env::var("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .or_else(|_| env::var("TZ"))
                .unwrap_or(defaults.default_timezone),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
