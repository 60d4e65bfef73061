//! Process configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LOTLEDGER_STORE` | `memory` (`memory` or `postgres`) |
//! | `DATABASE_URL` | required for `postgres` |
//! | `LOTLEDGER_DB_MAX_CONNECTIONS` | `5` |
//! | `LOTLEDGER_LOT_PREFIX` | `L` |
//! | `LOTLEDGER_LOT_WIDTH` | `6` |
//!
//! Log output format is configured separately by `lotledger-observability`.

use thiserror::Error;

pub const STORE_VAR: &str = "LOTLEDGER_STORE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "LOTLEDGER_DB_MAX_CONNECTIONS";
pub const LOT_PREFIX_VAR: &str = "LOTLEDGER_LOT_PREFIX";
pub const LOT_WIDTH_VAR: &str = "LOTLEDGER_LOT_WIDTH";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MAX_LOT_WIDTH: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unsupported value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

impl StoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Some(StoreKind::Memory),
            "postgres" | "postgresql" | "pg" => Some(StoreKind::Postgres),
            _ => None,
        }
    }
}

/// Renders lot-number sequence values, e.g. `L000042`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotNumberFormat {
    pub prefix: String,
    pub width: usize,
}

impl Default for LotNumberFormat {
    fn default() -> Self {
        Self {
            prefix: "L".to_string(),
            width: 6,
        }
    }
}

impl LotNumberFormat {
    pub fn format(&self, sequence: u64) -> String {
        format!("{}{:0width$}", self.prefix, sequence, width = self.width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub lot_numbers: LotNumberFormat,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let store = match get(STORE_VAR) {
            Some(raw) => StoreKind::parse(&raw).ok_or(ConfigError::Invalid {
                var: STORE_VAR,
                value: raw,
            })?,
            None => StoreKind::Memory,
        };

        let database_url = get(DATABASE_URL_VAR);
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing(DATABASE_URL_VAR));
        }

        let db_max_connections = match get(MAX_CONNECTIONS_VAR) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: MAX_CONNECTIONS_VAR,
                        value: raw,
                    });
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let mut lot_numbers = LotNumberFormat::default();
        if let Some(prefix) = lookup(LOT_PREFIX_VAR) {
            lot_numbers.prefix = prefix.trim().to_string();
        }
        if let Some(raw) = get(LOT_WIDTH_VAR) {
            lot_numbers.width = match raw.trim().parse::<usize>() {
                Ok(w) if (1..=MAX_LOT_WIDTH).contains(&w) => w,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: LOT_WIDTH_VAR,
                        value: raw,
                    });
                }
            };
        }

        Ok(Self {
            store,
            database_url,
            db_max_connections,
            lot_numbers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_to_memory_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.lot_numbers.format(42), "L000042");
    }

    #[test]
    fn postgres_requires_database_url() {
        assert_eq!(
            config(&[(STORE_VAR, "postgres")]),
            Err(ConfigError::Missing(DATABASE_URL_VAR))
        );

        let cfg = config(&[
            (STORE_VAR, "Postgres"),
            (DATABASE_URL_VAR, "postgres://localhost/ledger"),
            (MAX_CONNECTIONS_VAR, "12"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreKind::Postgres);
        assert_eq!(cfg.db_max_connections, 12);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[(STORE_VAR, "sqlite")]),
            Err(ConfigError::Invalid { var: STORE_VAR, .. })
        ));
        assert!(matches!(
            config(&[(MAX_CONNECTIONS_VAR, "0")]),
            Err(ConfigError::Invalid { var: MAX_CONNECTIONS_VAR, .. })
        ));
        assert!(matches!(
            config(&[(LOT_WIDTH_VAR, "abc")]),
            Err(ConfigError::Invalid { var: LOT_WIDTH_VAR, .. })
        ));
    }

    #[test]
    fn lot_number_format_is_configurable() {
        let cfg = config(&[(LOT_PREFIX_VAR, "RP-"), (LOT_WIDTH_VAR, "4")]).unwrap();
        assert_eq!(cfg.lot_numbers.format(7), "RP-0007");
        // Width is a minimum, never a truncation.
        assert_eq!(cfg.lot_numbers.format(123_456), "RP-123456");
    }
}
