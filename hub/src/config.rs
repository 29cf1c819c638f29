use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::db::schema::{DatasetKind, DatasetOverrides, ExchangeOverride};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid identifier for {key}: {value:?}")]
    InvalidIdentifier { key: String, value: String },
}

/// Hub configuration derived from environment variables.
///
/// Schema override names (`CANDLE_TABLE`, `EMA_EXCHANGE_COLUMN`, ...) match
/// the ones the existing deployments already set.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,

    // ── Store ──────────────────────────────────────────────────────
    pub db_path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,

    pub schema: SchemaConfig,
}

/// Per-dataset schema overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaConfig {
    pub candle: DatasetOverrides,
    pub footprint: DatasetOverrides,
    pub cvd: DatasetOverrides,
    pub ema: DatasetOverrides,
    pub normalize_time_frames: bool,
}

fn env_str(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u16) -> u16 {
    lookup(name)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    lookup(name)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

/// SQL identifiers must be `[A-Za-z0-9_]+`.
pub fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn env_identifier(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<String>, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw.trim();
    // Blank means "use the default" for everything but the exchange column.
    if value.is_empty() {
        return Ok(None);
    }
    if !is_identifier(value) {
        return Err(ConfigError::InvalidIdentifier {
            key: name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(Some(value.to_string()))
}

fn dataset_overrides(
    lookup: &impl Fn(&str) -> Option<String>,
    kind: DatasetKind,
) -> Result<DatasetOverrides, ConfigError> {
    let p = kind.env_prefix();

    let exchange_key = format!("{p}_EXCHANGE_COLUMN");
    let exchange_column = match lookup(exchange_key.as_str()) {
        None => ExchangeOverride::Inherit,
        Some(raw) if raw.trim().is_empty() => ExchangeOverride::Disabled,
        Some(raw) => {
            let value = raw.trim();
            if !is_identifier(value) {
                return Err(ConfigError::InvalidIdentifier {
                    key: exchange_key,
                    value: value.to_string(),
                });
            }
            ExchangeOverride::Column(value.to_string())
        }
    };

    let json_key = format!("{p}_JSON_COLUMNS");
    let json_columns = match lookup(json_key.as_str()) {
        None => None,
        Some(raw) => {
            let mut cols = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !is_identifier(part) {
                    return Err(ConfigError::InvalidIdentifier {
                        key: json_key.clone(),
                        value: part.to_string(),
                    });
                }
                cols.push(part.to_string());
            }
            Some(cols)
        }
    };

    Ok(DatasetOverrides {
        table: env_identifier(lookup, &format!("{p}_TABLE"))?,
        symbol_column: env_identifier(lookup, &format!("{p}_SYMBOL_COLUMN"))?,
        time_frame_column: env_identifier(lookup, &format!("{p}_TIME_FRAME_COLUMN"))?,
        timestamp_column: env_identifier(lookup, &format!("{p}_TIMESTAMP_COLUMN"))?,
        exchange_column,
        json_columns,
    })
}

impl SchemaConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            candle: dataset_overrides(&lookup, DatasetKind::Candle)?,
            footprint: dataset_overrides(&lookup, DatasetKind::Footprint)?,
            cvd: dataset_overrides(&lookup, DatasetKind::Cvd)?,
            ema: dataset_overrides(&lookup, DatasetKind::Ema)?,
            normalize_time_frames: env_bool(&lookup, "NORMALIZE_TIME_FRAMES", true),
        })
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind: env_str(&lookup, "HUB_BIND", "127.0.0.1"),
            port: env_u16(&lookup, "HUB_PORT", 9000),
            db_path: PathBuf::from(env_str(&lookup, "MARKET_DB_PATH", "market_data.db")),
            pool_size: env_u32(&lookup, "MARKET_DB_POOL_SIZE", 4).max(1),
            busy_timeout_ms: env_u64(&lookup, "MARKET_DB_BUSY_TIMEOUT_MS", 5000),
            schema: SchemaConfig::from_lookup(&lookup)?,
        })
    }
}
