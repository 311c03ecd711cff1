use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the trader runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub sandbox: SandboxConfig,
    pub exchanges: ExchangesConfig,
    pub events: EventsConfig,
}

/// Connection settings for the PostgreSQL storage service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Overridden by `DATABASE_URL` when that variable is set.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/traders".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Diagnostic logging. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "runner.log".to_string(),
        }
    }
}

/// Limits applied to every script sandbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum number of interpreter operations per run. 0 means unlimited.
    pub max_operations: u64,
    pub max_call_levels: usize,
    /// How often a sleeping script re-checks for a pending halt.
    pub sleep_slice_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 64,
            sleep_slice_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangesConfig {
    pub binance: BinanceConfig,
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub recv_window_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            recv_window_ms: 5000,
        }
    }
}

/// Parameters for the in-memory paper exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub quote_asset: String,
    pub initial_quote_balance: Decimal,
    /// 0.001 corresponds to 0.1%.
    pub fee_rate: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            initial_quote_balance: dec!(10000),
            fee_rate: dec!(0.001),
        }
    }
}

/// Settings for the trader event stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
    /// Persist every trader event to the `trader_logs` table.
    pub persist: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            persist: false,
        }
    }
}
