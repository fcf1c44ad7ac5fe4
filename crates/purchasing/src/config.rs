//! Import pipeline configuration.

use core::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tirestock_inventory::LedgerConfig;

pub const LINE_TOTAL_TOLERANCE_ENV: &str = "TIRESTOCK_LINE_TOTAL_TOLERANCE";
pub const LOCK_TIMEOUT_MS_ENV: &str = "TIRESTOCK_LOCK_TIMEOUT_MS";

/// Tunables for parsing, reconciliation and ledger access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Largest accepted |quantity * unit value - line total|.
    pub line_total_tolerance: Decimal,
    /// Bounded wait for a held per-key ledger lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            line_total_tolerance: Decimal::new(1, 2),
            lock_timeout_ms: 250,
        }
    }
}

impl ImportConfig {
    /// Read overrides from `TIRESTOCK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables keep their
    /// defaults; unparseable or negative ones are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(LINE_TOTAL_TOLERANCE_ENV) {
            match Decimal::from_str(raw.trim()) {
                Ok(v) if !v.is_sign_negative() => config.line_total_tolerance = v,
                _ => tracing::warn!(
                    variable = LINE_TOTAL_TOLERANCE_ENV,
                    value = %raw,
                    "ignoring invalid tolerance; using default"
                ),
            }
        }

        if let Some(raw) = lookup(LOCK_TIMEOUT_MS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(v) => config.lock_timeout_ms = v,
                Err(_) => tracing::warn!(
                    variable = LOCK_TIMEOUT_MS_ENV,
                    value = %raw,
                    "ignoring invalid lock timeout; using default"
                ),
            }
        }

        config
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Ledger settings derived from this configuration.
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_timeout: self.lock_timeout(),
        }
    }
}
