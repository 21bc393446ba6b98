//! Runtime settings read once from the environment.

use std::collections::HashMap;

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_WEIGHT_KG: i64 = 1_000_000;
pub const DEFAULT_DEDUP_SECS: i64 = 5;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Postgres stores when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub max_weight_kg: Decimal,
    pub quick_create_dedup_secs: i64,
    pub indicator_connected: bool,
    pub db_max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_weight_kg: Decimal::from(DEFAULT_MAX_WEIGHT_KG),
            quick_create_dedup_secs: DEFAULT_DEDUP_SECS,
            indicator_connected: false,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

fn parsed<T: core::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value, "ignoring malformed setting");
            default
        }),
    }
}

fn parsed_bool(key: &str, raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(key, value = %v, "ignoring malformed setting");
                default
            }
        },
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_weight_kg: Decimal =
            parsed("WEIGHBRIDGE_MAX_WEIGHT_KG", get("WEIGHBRIDGE_MAX_WEIGHT_KG"), defaults.max_weight_kg);
        let max_weight_kg = if max_weight_kg <= Decimal::ZERO {
            warn!(%max_weight_kg, "max weight must be positive, using default");
            defaults.max_weight_kg
        } else {
            max_weight_kg
        };
        let dedup: i64 = parsed(
            "WEIGHBRIDGE_QUICK_CREATE_DEDUP_SECS",
            get("WEIGHBRIDGE_QUICK_CREATE_DEDUP_SECS"),
            defaults.quick_create_dedup_secs,
        );

        Self {
            database_url: get("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            bind_addr: get("WEIGHBRIDGE_BIND_ADDR")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.bind_addr),
            max_weight_kg,
            quick_create_dedup_secs: dedup.max(0),
            indicator_connected: parsed_bool(
                "WEIGHBRIDGE_INDICATOR_CONNECTED",
                get("WEIGHBRIDGE_INDICATOR_CONNECTED"),
                defaults.indicator_connected,
            ),
            db_max_connections: parsed(
                "WEIGHBRIDGE_DB_MAX_CONNECTIONS",
                get("WEIGHBRIDGE_DB_MAX_CONNECTIONS"),
                defaults.db_max_connections,
            ),
        }
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::seconds(self.quick_create_dedup_secs)
    }
}
