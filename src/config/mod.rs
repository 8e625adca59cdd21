use chrono::{Duration, FixedOffset};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::services::ledger::LedgerSettings;

// Top-level container for every setting
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub cache_ttl_seconds: u64,
}

// Seat hold and sweep tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub hold_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub expired_retention_seconds: i64,
    pub max_seats_per_hold: usize,
    /// Offset of the venue's local time from UTC; showtimes are stored in local time.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError::Invalid { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("PORT", "8000")?,
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "cinema_seating=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parse_or("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                cache_ttl_seconds: parse_or("REDIS_CACHE_TTL_SECONDS", "60")?,
            },
            reservation: ReservationConfig {
                hold_ttl_seconds: parse_or("HOLD_TTL_SECONDS", "300")?,
                sweep_interval_seconds: parse_or("HOLD_SWEEP_INTERVAL_SECONDS", "30")?,
                expired_retention_seconds: parse_or("HOLD_EXPIRED_RETENTION_SECONDS", "600")?,
                max_seats_per_hold: parse_or("MAX_SEATS_PER_HOLD", "10")?,
                utc_offset_minutes: parse_or("APP_UTC_OFFSET_MINUTES", "420")?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

impl ReservationConfig {
    pub fn ledger_settings(&self) -> Result<LedgerSettings, ConfigError> {
        let venue_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid {
                key: "APP_UTC_OFFSET_MINUTES",
                value: self.utc_offset_minutes.to_string(),
            }
        })?;
        if self.hold_ttl_seconds <= 0 {
            return Err(ConfigError::Invalid {
                key: "HOLD_TTL_SECONDS",
                value: self.hold_ttl_seconds.to_string(),
            });
        }
        Ok(LedgerSettings {
            hold_ttl: Duration::seconds(self.hold_ttl_seconds),
            max_seats_per_hold: self.max_seats_per_hold,
            expired_retention: Duration::seconds(self.expired_retention_seconds),
            venue_offset,
        })
    }
}
